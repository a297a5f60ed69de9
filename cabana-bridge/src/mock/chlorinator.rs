//! Mock salt chlorinator.
//!
//! Readings are synthesized around the commanded output percentage: the
//! cell reports a value in the 56..=90 band, `56 + pct * 34 / 100` plus
//! a couple of counts of jitter, persisted so back-to-back polls agree.

use crate::dispatch::DispatchTable;
use crate::protocol::actions::ChlorinatorAction;
use crate::protocol::{Frame, Protocol};

use super::{jitter, MockState};

/// The model string reported by action 20, ASCII at payload offset 1.
const MODEL: &[u8; 16] = b"INTELLICHLOR--60";

/// Low end of the reading band (0% output).
const READING_FLOOR: u8 = 56;
/// High end of the reading band (100% output).
const READING_CEIL: u8 = 90;

pub fn register(table: &mut DispatchTable<MockState, Option<Frame>>) {
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::SetControl as u8,
        set_control,
    );
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::SetOutput as u8,
        set_output,
    );
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::GetModel as u8,
        get_model,
    );
}

/// Set-control acks with a two-byte zeroed payload.
fn set_control(frame: &Frame, _state: &mut MockState) -> Option<Frame> {
    Some(frame.reply(ChlorinatorAction::Ack as u8, vec![0, 0]))
}

/// Set-output acks with a simulated reading, `[reading, 128]`.
fn set_output(frame: &Frame, state: &mut MockState) -> Option<Frame> {
    let pct = frame.payload.first().copied().unwrap_or(0).min(100);
    state.chlor_output_pct = pct;
    state.chlor_reading = simulate_reading(pct);
    Some(frame.reply(
        ChlorinatorAction::SaltReading as u8,
        vec![state.chlor_reading, 128],
    ))
}

/// Get-model replies with the fixed model string.
fn get_model(frame: &Frame, _state: &mut MockState) -> Option<Frame> {
    let mut payload = vec![0u8];
    payload.extend_from_slice(MODEL);
    Some(frame.reply(ChlorinatorAction::Model as u8, payload))
}

fn simulate_reading(pct: u8) -> u8 {
    let base = i32::from(READING_FLOOR) + i32::from(pct) * 34 / 100;
    (base + jitter(2)).clamp(i32::from(READING_FLOOR), i32::from(READING_CEIL)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_output_reads_near_the_top_of_the_band() {
        for _ in 0..50 {
            let reading = simulate_reading(100);
            assert!((88..=90).contains(&reading), "reading {reading} out of band");
        }
    }

    #[test]
    fn zero_output_reads_at_the_floor() {
        for _ in 0..50 {
            let reading = simulate_reading(0);
            assert!((56..=58).contains(&reading), "reading {reading} out of band");
        }
    }

    #[test]
    fn set_output_persists_the_reading() {
        let mut state = MockState::default();
        let request = Frame::chlorinator(1, 17, vec![100]);
        let reply = set_output(&request, &mut state).unwrap();

        assert_eq!(reply.action, 18);
        assert_eq!(reply.payload.len(), 2);
        assert_eq!(reply.payload[0], state.chlor_reading);
        assert_eq!(reply.payload[1], 128);
        assert_eq!(state.chlor_output_pct, 100);
        // Addressed back at the controller side of the bus.
        assert_eq!(reply.dest, request.source);
        assert_eq!(reply.source, request.dest);
    }

    #[test]
    fn model_reply_embeds_ascii_at_offset_1() {
        let mut state = MockState::default();
        let request = Frame::chlorinator(1, 20, vec![0]);
        let reply = get_model(&request, &mut state).unwrap();

        assert_eq!(reply.action, 3);
        assert_eq!(reply.payload.len(), 17);
        assert_eq!(&reply.payload[1..], b"INTELLICHLOR--60");
    }

    #[test]
    fn set_control_acks_with_zeroed_payload() {
        let mut state = MockState::default();
        let request = Frame::chlorinator(1, 0, vec![0]);
        let reply = set_control(&request, &mut state).unwrap();
        assert_eq!(reply.action, 1);
        assert_eq!(reply.payload, vec![0, 0]);
    }
}
