//! The bridge daemon.
//!
//! Connects to the bus byte stream (a TCP serial bridge by default) or,
//! with `CABANA_MOCK` set, to the in-process mock equipment, then runs
//! until SIGINT/SIGTERM.

use std::env;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::signal::unix::{self, SignalKind};

use cabana_bridge::tracing::prelude::*;
use cabana_bridge::{Engine, QueueConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cabana_bridge::tracing::init_journald_or_stdout();

    let config = QueueConfig::default();
    let engine = if env::var("CABANA_MOCK").is_ok() {
        info!("Using mock equipment (CABANA_MOCK set).");
        Engine::mock(config)
    } else {
        // CABANA_BUS_ADDR points at the serial-to-TCP bridge for the
        // RS485 adapter.
        let addr = env::var("CABANA_BUS_ADDR").unwrap_or_else(|_| "127.0.0.1:9801".to_string());
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connecting to bus at {addr}"))?;
        info!("Connected to bus at {addr}.");
        let (reader, writer) = stream.into_split();
        Engine::new(reader, writer, config)
    };

    info!("Started.");
    info!("For debugging, set RUST_LOG=cabana_bridge=debug or trace.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT.");
        },
        _ = sigterm.recv() => {
            info!("Received SIGTERM.");
        },
    }

    engine.shutdown().await;
    info!("Exiting.");
    Ok(())
}
