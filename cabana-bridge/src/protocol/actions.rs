//! Action codes with known semantics.
//!
//! The bus carries far more action codes than the bridge interprets; these
//! enums name the ones the dispatcher, queue, and mock care about. Codes
//! outside them are still valid frames and flow through unharmed.

use strum::FromRepr;

/// Controller-protocol actions handled by the bridge.
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerAction {
    /// Panel acknowledgement; payload echoes the acked action code.
    Ack = 1,
    /// Periodic equipment status broadcast.
    EquipmentStatus = 2,
    /// Chlorinator setpoints/salt broadcast.
    ChlorinatorStatus = 25,
    /// Write heat setpoints.
    SetHeatSetpoint = 136,
    /// Write heat-pump configuration.
    SetHeatPump = 144,
    /// Read back heat setpoints.
    GetHeatSetpoint = 200,
    /// Read back heat-pump configuration.
    GetHeatPump = 208,
}

/// Chlorinator-protocol actions.
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChlorinatorAction {
    SetControl = 0,
    Ack = 1,
    /// Model-name reply to `GetModel`.
    Model = 3,
    SetOutput = 17,
    /// Salt reading; payload is `[salt/50, status]`.
    SaltReading = 18,
    GetModel = 20,
    SetSaltCellConfig = 21,
    GetVersion = 22,
}

/// Pump-protocol actions.
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PumpAction {
    /// Write a speed/program register; payload carries the value big-endian
    /// in its last two bytes.
    SetRegister = 1,
    SetRunState = 6,
    /// Status poll and its 15-byte reply.
    Status = 7,
    SetRemoteControl = 4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_repr_covers_wire_values() {
        assert_eq!(ControllerAction::from_repr(136), Some(ControllerAction::SetHeatSetpoint));
        assert_eq!(ChlorinatorAction::from_repr(18), Some(ChlorinatorAction::SaltReading));
        assert_eq!(PumpAction::from_repr(7), Some(PumpAction::Status));
        assert_eq!(ControllerAction::from_repr(99), None);
    }
}
