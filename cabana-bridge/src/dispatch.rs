//! Dispatch-by-key over `(protocol, action)`.
//!
//! One mechanism serves two masters: the live [`Dispatcher`] routes
//! inbound frames to handlers that mutate [`EquipmentState`], and the
//! mock responder routes outbound frames to handlers that synthesize
//! replies. Both are `DispatchTable` instances with different handler
//! sets, so the two sides cannot drift apart structurally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::protocol::{Frame, Protocol};
use crate::state::{EquipmentState, SharedState};
use crate::tracing::prelude::*;

/// A registered handler. Plain fn pointers keep the table `Copy`-cheap
/// and force handlers to stay free of captured context; everything they
/// need travels in the frame or the state argument.
pub type Handler<S, R> = fn(&Frame, &mut S) -> R;

pub struct DispatchTable<S, R> {
    handlers: HashMap<(Protocol, u8), Handler<S, R>>,
}

impl<S, R> Default for DispatchTable<S, R> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S, R> DispatchTable<S, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, protocol: Protocol, action: u8, handler: Handler<S, R>) {
        if self.handlers.insert((protocol, action), handler).is_some() {
            warn!("handler for {protocol:?} action {action} registered twice, keeping the last");
        }
    }

    /// Invoke the handler for `frame`, or `None` if nothing is registered.
    pub fn dispatch(&self, frame: &Frame, state: &mut S) -> Option<R> {
        self.handlers
            .get(&(frame.protocol, frame.action))
            .map(|handler| handler(frame, state))
    }

    pub fn is_registered(&self, protocol: Protocol, action: u8) -> bool {
        self.handlers.contains_key(&(protocol, action))
    }
}

/// The live inbound dispatcher: validated frames in, state updates out.
pub struct Dispatcher {
    table: DispatchTable<EquipmentState, ()>,
    state: SharedState,
    seen: AtomicU64,
}

impl Dispatcher {
    pub fn new(table: DispatchTable<EquipmentState, ()>, state: SharedState) -> Self {
        Self {
            table,
            state,
            seen: AtomicU64::new(0),
        }
    }

    /// Route one inbound frame. Unknown `(protocol, action)` pairs are
    /// normal bus chatter: logged at info, otherwise a no-op.
    pub fn dispatch(&self, frame: &Frame) {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("message {n}: {frame}");

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.table.dispatch(frame, &mut state).is_none() {
            info!(
                "no handler for {:?} action {}, ignoring",
                frame.protocol, frame.action
            );
        }
    }

    /// Total frames routed since construction.
    pub fn messages_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;

    fn bump_mode(_frame: &Frame, state: &mut EquipmentState) {
        state.controller.mode = 7;
    }

    #[test]
    fn routes_by_protocol_and_action() {
        let mut table = DispatchTable::new();
        table.register(Protocol::Controller, 2, bump_mode);

        let dispatcher = Dispatcher::new(table, state::shared());
        dispatcher.dispatch(&Frame::command(16, 2, vec![]));

        assert_eq!(dispatcher.state().read().unwrap().controller.mode, 7);
        assert_eq!(dispatcher.messages_seen(), 1);
    }

    #[test]
    fn unknown_action_leaves_state_untouched() {
        let table = DispatchTable::new();
        let dispatcher = Dispatcher::new(table, state::shared());

        dispatcher.dispatch(&Frame::command(16, 99, vec![1, 2, 3]));

        let state = dispatcher.state();
        let state = state.read().unwrap();
        assert_eq!(state.controller.mode, 0);
        assert!(state.pumps.is_empty());
    }

    #[test]
    fn same_action_different_protocol_is_distinct() {
        let mut table: DispatchTable<EquipmentState, ()> = DispatchTable::new();
        table.register(Protocol::Controller, 1, bump_mode);
        assert!(table.is_registered(Protocol::Controller, 1));
        assert!(!table.is_registered(Protocol::Pump, 1));
    }
}
