//! Packet-capture log replay.
//!
//! Logs are newline-delimited JSON records of raw packets, as written by
//! the capture tooling:
//!
//! ```text
//! {"type":"packet","direction":"inbound","packet":[255,0,255,165,...],"ts":"..."}
//! ```
//!
//! Replaying feeds each inbound packet through decode and dispatch in
//! file order, reconstructing the equipment state a live bridge would
//! have held.

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use thiserror::Error;

use crate::dispatch::Dispatcher;
use crate::protocol::Frame;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub direction: Direction,
    pub packet: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl PacketRecord {
    pub fn is_packet(&self) -> bool {
        self.kind == "packet"
    }
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed reading log: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// Parse a log into records, blank lines skipped, line numbers attached
/// to parse failures.
pub fn read_log<R: BufRead>(reader: R) -> Result<Vec<PacketRecord>, ReplayError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: PacketRecord =
            serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
                line: idx + 1,
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

/// What a replay pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: usize,
    pub dispatched: usize,
    pub decode_failures: usize,
}

/// Feed every inbound packet through decode → dispatch, in file order.
///
/// Undecodable packets are counted, not fatal: captures routinely include
/// the same collision noise the live bus carries.
pub fn replay(records: &[PacketRecord], dispatcher: &Dispatcher) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for record in records {
        if !record.is_packet() || record.direction != Direction::Inbound {
            continue;
        }
        summary.records += 1;
        match Frame::decode(&record.packet) {
            Ok(frame) => {
                dispatcher.dispatch(&frame);
                summary.dispatched += 1;
            }
            Err(err) => {
                debug!("replay: undecodable packet ({err})");
                summary.decode_failures += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers;
    use crate::state;

    const LOG: &str = concat!(
        r#"{"type":"packet","direction":"inbound","packet":[255,0,255,165,0,16,96,7,15,4,0,0,0,0,0,0,0,0,0,0,0,0,17,31,1,95],"ts":"2026-08-29T10:00:00Z"}"#,
        "\n",
        r#"{"type":"packet","direction":"outbound","packet":[255,0,255,165,0,96,16,7,0,1,28]}"#,
        "\n\n",
        r#"{"type":"packet","direction":"inbound","packet":[16,0,18,90,128,252,16,3]}"#,
        "\n",
    );

    #[test]
    fn parses_records_and_skips_blank_lines() {
        let records = read_log(LOG.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].direction, Direction::Inbound);
        assert_eq!(records[1].direction, Direction::Outbound);
        assert_eq!(records[0].ts.as_deref(), Some("2026-08-29T10:00:00Z"));
        assert_eq!(records[2].packet.len(), 8);
    }

    #[test]
    fn parse_failures_carry_the_line_number() {
        let log = "{\"type\":\"packet\"\n";
        match read_log(log.as_bytes()) {
            Err(ReplayError::Parse { line: 1, .. }) => {}
            other => panic!("expected parse error on line 1, got {other:?}"),
        }
    }

    #[test]
    fn replay_dispatches_inbound_only() {
        let records = read_log(LOG.as_bytes()).unwrap();
        let dispatcher = Dispatcher::new(handlers::default_table(), state::shared());
        let summary = replay(&records, &dispatcher);

        assert_eq!(summary.records, 2);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.decode_failures, 0);

        let state = dispatcher.state();
        let state = state.read().unwrap();
        assert_eq!(state.pumps.get(&96).unwrap().rpm, 0);
        assert_eq!(state.chlorinator.salt_ppm, 4500);
    }

    #[test]
    fn round_trips_through_serde() {
        let record = PacketRecord {
            kind: "packet".into(),
            direction: Direction::Inbound,
            packet: vec![16, 0, 18, 90, 128, 252, 16, 3],
            ts: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("ts"));
        let back: PacketRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.packet, record.packet);
    }
}
