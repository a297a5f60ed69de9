//! Mock outdoor control panel.
//!
//! Set commands get the panel's minimal ack; get commands are logged and
//! left unanswered, which exercises the write queue's retry path the
//! same way a real panel with an unsupported firmware would.

use crate::dispatch::DispatchTable;
use crate::protocol::actions::ControllerAction;
use crate::protocol::{Frame, Protocol};
use crate::tracing::prelude::*;

use super::MockState;

/// Panel set actions that are acknowledged.
const SET_ACTIONS: &[u8] = &[
    131, 133, 134, 136, 138, 139, 144, 145, 146, 147, 150, 152, 153, 155, 157, 158, 160, 161, 162,
    163, 167, 168,
];

/// Panel get actions the mock knows about but does not answer.
const GET_ACTIONS: &[u8] = &[
    194, 197, 198, 200, 202, 203, 208, 209, 210, 211, 214, 215, 216, 217, 219, 221, 222, 224, 225,
    226, 227, 231, 232, 239, 253,
];

pub fn register(table: &mut DispatchTable<MockState, Option<Frame>>) {
    for &action in SET_ACTIONS {
        table.register(Protocol::Controller, action, ack_set);
    }
    for &action in GET_ACTIONS {
        table.register(Protocol::Controller, action, unanswered_get);
    }
}

/// Minimal panel ack: action 1, payload echoing the acked action code.
fn ack_set(frame: &Frame, _state: &mut MockState) -> Option<Frame> {
    Some(frame.reply(ControllerAction::Ack as u8, vec![frame.action]))
}

fn unanswered_get(frame: &Frame, _state: &mut MockState) -> Option<Frame> {
    info!("mock panel: get action {} not programmed yet", frame.action);
    None
}
