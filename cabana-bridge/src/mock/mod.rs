//! Mock equipment responder.
//!
//! Stands in for the physical bus: frames written by the queue are
//! decoded, answered by per-device handlers, and the encoded replies are
//! looped back through the normal inbound path. The responder is the
//! same dispatch-by-key mechanism as the live dispatcher, instantiated
//! over [`MockState`] and returning an optional reply frame. Replies
//! always travel through the codec; the mock never fabricates bytes.

mod chlorinator;
mod controller;
mod pump;

use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;

use crate::dispatch::DispatchTable;
use crate::protocol::Frame;
use crate::tracing::prelude::*;
use crate::transport::BusTransport;

/// Scratch state the mock devices keep between calls, so repeated
/// queries return stable-ish values instead of constants.
#[derive(Debug, Default)]
pub struct MockState {
    /// Last commanded chlorinator output percentage.
    pub chlor_output_pct: u8,
    /// Last simulated chlorinator reading, held in the 56..=90 band.
    pub chlor_reading: u8,
    /// Commanded pump speed, keyed by bus address.
    pub pump_rpm: BTreeMap<u8, u16>,
}

/// The full responder table: controller, chlorinator, and pump handlers.
pub fn responder_table() -> DispatchTable<MockState, Option<Frame>> {
    let mut table = DispatchTable::new();
    controller::register(&mut table);
    chlorinator::register(&mut table);
    pump::register(&mut table);
    table
}

/// Bounded symmetric jitter, `-bound..=bound`.
fn jitter(bound: i32) -> i32 {
    rand::thread_rng().gen_range(-bound..=bound)
}

/// A [`BusTransport`] backed by the responder instead of hardware.
///
/// Encoded replies go out the loopback channel; the engine presents that
/// channel as the inbound byte stream, so mock traffic takes exactly the
/// same decode path as live traffic.
pub struct MockBus {
    table: DispatchTable<MockState, Option<Frame>>,
    state: MockState,
    loopback: mpsc::Sender<Vec<u8>>,
}

impl MockBus {
    pub fn new(loopback: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            table: responder_table(),
            state: MockState::default(),
            loopback,
        }
    }
}

#[async_trait]
impl BusTransport for MockBus {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                // The queue validates at admission, so this is a bug in
                // the caller, not bus noise.
                warn!("mock bus received undecodable bytes: {err}");
                return Ok(());
            }
        };
        match self.table.dispatch(&frame, &mut self.state) {
            Some(Some(reply)) => {
                let encoded = reply
                    .encode()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                // A dropped engine just means nobody is listening anymore.
                let _ = self.loopback.send(encoded).await;
            }
            Some(None) => {}
            None => {
                info!(
                    "mock: {:?} action {} not programmed yet",
                    frame.protocol, frame.action
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    #[test]
    fn unregistered_action_yields_no_reply() {
        let table = responder_table();
        let mut state = MockState::default();
        // Chlorinator action 19 is deliberately absent.
        let frame = Frame::chlorinator(1, 19, vec![]);
        assert_eq!(table.dispatch(&frame, &mut state), None);
    }

    #[test]
    fn table_covers_all_three_protocols() {
        let table = responder_table();
        assert!(table.is_registered(Protocol::Controller, 136));
        assert!(table.is_registered(Protocol::Chlorinator, 17));
        assert!(table.is_registered(Protocol::Pump, 7));
    }
}
