//! RS485 pool-equipment bus bridge.
//!
//! The core is a packet protocol engine for the shared half-duplex bus
//! that pool controllers, variable-speed pumps, and salt chlorinators
//! hang off of: a frame codec for the bus's two incompatible wire
//! formats, an inbound dispatcher that routes validated frames into the
//! equipment-state store, an outbound write queue with ack matching and
//! bounded retries, and a mock equipment responder for offline
//! development and replaying packet captures.

pub mod dispatch;
pub mod engine;
pub mod handlers;
pub mod mock;
pub mod protocol;
pub mod queue;
pub mod replay;
pub mod state;
pub mod tracing;
pub mod transport;

pub use engine::Engine;
pub use protocol::{Frame, Protocol};
pub use queue::{QueueConfig, QueueError, QueueHandle};
