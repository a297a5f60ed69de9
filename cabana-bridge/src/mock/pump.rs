//! Mock variable-speed pump.
//!
//! Status replies derive watts from the commanded speed with a little
//! jitter; generic commands get the pump's echo-style ack.

use time::OffsetDateTime;

use crate::dispatch::DispatchTable;
use crate::protocol::actions::PumpAction;
use crate::protocol::{Frame, Protocol};

use super::{jitter, MockState};

/// Nominal full speed used to scale watts, matching common VS pumps.
const MAX_RPM: u32 = 3450;

pub fn register(table: &mut DispatchTable<MockState, Option<Frame>>) {
    table.register(Protocol::Pump, PumpAction::Status as u8, status);
    table.register(Protocol::Pump, PumpAction::SetRegister as u8, set_register);
    table.register(Protocol::Pump, PumpAction::SetRemoteControl as u8, ack);
    table.register(Protocol::Pump, PumpAction::SetRunState as u8, ack);
}

/// 15-byte status reply: watts big-endian at 3, rpm big-endian at 5,
/// flow at 7, status big-endian at 11, then hour and minute.
fn status(frame: &Frame, state: &mut MockState) -> Option<Frame> {
    let rpm = state.pump_rpm.get(&frame.dest).copied().unwrap_or(0);
    let watts = simulate_watts(rpm);
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());

    let mut payload = vec![0u8; 15];
    payload[0] = 2; // command register
    payload[2] = 2; // drive state
    payload[3..5].copy_from_slice(&watts.to_be_bytes());
    payload[5..7].copy_from_slice(&rpm.to_be_bytes());
    payload[12] = 1; // status: ok
    payload[13] = now.hour();
    payload[14] = now.minute();
    Some(frame.reply(PumpAction::Status as u8, payload))
}

/// Register writes remember the commanded speed (big-endian value in the
/// last two payload bytes) and ack with the action echo.
fn set_register(frame: &Frame, state: &mut MockState) -> Option<Frame> {
    if frame.payload.len() >= 4 {
        if let [.., hi, lo] = frame.payload[..] {
            state
                .pump_rpm
                .insert(frame.dest, u16::from_be_bytes([hi, lo]));
        }
    }
    ack(frame, state)
}

fn ack(frame: &Frame, _state: &mut MockState) -> Option<Frame> {
    Some(frame.reply(frame.action, vec![frame.action]))
}

fn simulate_watts(rpm: u16) -> u16 {
    if rpm == 0 {
        return 0;
    }
    let nominal = u32::from(rpm) * 2000 / MAX_RPM;
    (nominal as i32 + jitter(100)).max(0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_the_commanded_speed() {
        let mut state = MockState::default();
        let set = Frame::command(96, 1, vec![2, 196, 3, 39]); // 807 rpm
        set_register(&set, &mut state);

        let poll = Frame::command(96, 7, vec![]);
        let reply = status(&poll, &mut state).unwrap();

        assert_eq!(reply.action, 7);
        assert_eq!(reply.payload.len(), 15);
        let rpm = u16::from_be_bytes([reply.payload[5], reply.payload[6]]);
        assert_eq!(rpm, 807);
        let watts = u16::from_be_bytes([reply.payload[3], reply.payload[4]]);
        // 807 rpm scales to ~467 W, jitter at most 100 either way.
        assert!((367..=567).contains(&watts), "watts {watts} out of range");
    }

    #[test]
    fn idle_pump_draws_nothing() {
        let mut state = MockState::default();
        let poll = Frame::command(96, 7, vec![]);
        let reply = status(&poll, &mut state).unwrap();
        assert_eq!(&reply.payload[3..7], &[0, 0, 0, 0]);
    }

    #[test]
    fn generic_command_acks_with_action_echo() {
        let mut state = MockState::default();
        let set = Frame::command(96, 6, vec![10]);
        let reply = ack(&set, &mut state).unwrap();
        assert_eq!(reply.action, 6);
        assert_eq!(reply.payload, vec![6]);
        assert_eq!(reply.source, 96);
    }
}
