//! Output formatting for dissected packet records.

use cabana_bridge::protocol::{Frame, Protocol};
use cabana_bridge::replay::{Direction, PacketRecord};
use colored::Colorize;

/// Output formatter configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub show_raw_hex: bool,
    pub use_color: bool,
}

/// Gray for the raw hex dump lines
fn gray_hex(text: &str) -> colored::ColoredString {
    text.truecolor(128, 128, 128)
}

fn direction_color(direction: Direction) -> colored::Color {
    match direction {
        Direction::Inbound => colored::Color::BrightYellow,
        Direction::Outbound => colored::Color::BrightCyan,
    }
}

fn protocol_label(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Controller => "CTRL",
        Protocol::Broadcast => "BCAST",
        Protocol::Pump => "PUMP",
        Protocol::Chlorinator => "CHLOR",
    }
}

/// One listing line per record: index, direction, dissection (or the
/// decode failure), optionally followed by the raw bytes.
pub fn format_record(index: usize, record: &PacketRecord, config: &OutputConfig) -> String {
    let direction_str = match record.direction {
        Direction::Inbound => "RX ←",
        Direction::Outbound => "TX →",
    };
    let direction_str = if config.use_color {
        format!("{}", direction_str.color(direction_color(record.direction)))
    } else {
        direction_str.to_string()
    };

    let ts = record.ts.as_deref().unwrap_or("-");

    let content = match Frame::decode(&record.packet) {
        Ok(frame) => format!(
            "{:5} {:>3} → {:<3} action {:>3} ({:2} bytes) {}",
            protocol_label(frame.protocol),
            frame.source,
            frame.dest,
            frame.action,
            frame.payload.len(),
            short_hex(&frame.payload),
        ),
        Err(err) => {
            let msg = format!("undecodable: {err}");
            if config.use_color {
                format!("{}", msg.red())
            } else {
                msg
            }
        }
    };

    let mut result = format!("{index:5} {ts} {direction_str} {content}");

    if config.show_raw_hex && !record.packet.is_empty() {
        let hex = record
            .packet
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        if config.use_color {
            result.push_str(&format!("\n        {}", gray_hex(&hex)));
        } else {
            result.push_str(&format!("\n        {hex}"));
        }
    }

    result
}

fn short_hex(payload: &[u8]) -> String {
    const SHOWN: usize = 16;
    let hex = payload
        .iter()
        .take(SHOWN)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if payload.len() > SHOWN {
        format!("{hex} …")
    } else {
        hex
    }
}

/// Whether a record would decode cleanly; drives the summary counts.
pub fn decodes(record: &PacketRecord) -> bool {
    Frame::decode(&record.packet).is_ok()
}
