//! Wire protocol for the RS485 pool-equipment bus.
//!
//! Two incompatible framings share the same wire: the length-prefixed
//! format used by the controller, pumps, and broadcast traffic, and the
//! trailer-delimited chlorinator format. [`Frame`] is the common in-memory
//! shape; [`BusCodec`] turns a raw byte stream into validated frames.

pub mod actions;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod frame;

pub use codec::BusCodec;
pub use error::{DecodeError, EncodeError};
pub use frame::{Frame, Protocol};

/// Well-known bus addresses.
pub mod address {
    /// The main outdoor control panel.
    pub const CONTROLLER: u8 = 16;
    /// Destination for panel broadcast traffic.
    pub const BROADCAST: u8 = 15;
    /// This bridge's own address on the bus.
    pub const BRIDGE: u8 = 33;
    /// First pump address; pumps occupy 96..=111.
    pub const PUMP_FIRST: u8 = 96;
    /// Last pump address.
    pub const PUMP_LAST: u8 = 111;
}

/// Whether `addr` is in the pump address range.
pub fn is_pump_address(addr: u8) -> bool {
    (address::PUMP_FIRST..=address::PUMP_LAST).contains(&addr)
}
