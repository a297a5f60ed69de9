//! Dissector and replayer for cabana packet-capture logs.
//!
//! Reads the bridge's newline-delimited JSON packet log, prints a
//! readable frame listing, and can optionally replay the inbound side
//! through the live dispatcher and dump the resulting equipment state.

mod output;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use cabana_bridge::dispatch::Dispatcher;
use cabana_bridge::replay::{self, Direction};
use cabana_bridge::{handlers, state};
use output::{format_record, OutputConfig};

/// Dissect and replay RS485 pool-bus packet logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a newline-delimited JSON packet log
    input: PathBuf,

    /// Show raw hex data for each packet
    #[arg(short = 'x', long)]
    hex: bool,

    /// Only show one direction (inbound, outbound)
    #[arg(short = 'f', long)]
    filter_direction: Option<String>,

    /// Replay inbound packets through the dispatcher and dump the
    /// resulting equipment state as JSON
    #[arg(short = 's', long)]
    state: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("cabana_bridge=debug".parse()?),
            )
            .init();
    }

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open packet log: {:?}", args.input))?;
    let records = replay::read_log(BufReader::new(file))
        .with_context(|| format!("Failed to parse packet log: {:?}", args.input))?;

    let config = OutputConfig {
        show_raw_hex: args.hex,
        use_color: !args.no_color && std::env::var("TERM").is_ok(),
    };

    let filter = match args.filter_direction.as_deref() {
        Some(s) if s.eq_ignore_ascii_case("inbound") => Some(Direction::Inbound),
        Some(s) if s.eq_ignore_ascii_case("outbound") => Some(Direction::Outbound),
        Some(other) => anyhow::bail!("Unknown direction filter: {other}"),
        None => None,
    };

    let mut undecodable = 0usize;
    for (index, record) in records.iter().enumerate() {
        if !record.is_packet() {
            continue;
        }
        if let Some(direction) = filter {
            if record.direction != direction {
                continue;
            }
        }
        if !output::decodes(record) {
            undecodable += 1;
        }
        println!("{}", format_record(index + 1, record, &config));
    }

    if args.state {
        let dispatcher = Dispatcher::new(handlers::default_table(), state::shared());
        let summary = replay::replay(&records, &dispatcher);
        eprintln!(
            "replayed {} inbound packets ({} dispatched, {} undecodable)",
            summary.records, summary.dispatched, summary.decode_failures
        );

        let state = dispatcher.state();
        let state = state
            .read()
            .map_err(|_| anyhow::anyhow!("state store poisoned"))?;
        println!("{}", serde_json::to_string_pretty(&*state)?);
    } else if undecodable > 0 {
        eprintln!("{undecodable} packet(s) did not decode cleanly");
    }

    Ok(())
}
