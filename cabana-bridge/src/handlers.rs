//! Default live handler registrations.
//!
//! Each handler copies raw decoded fields into the state store and
//! nothing more; interpretation belongs to whatever reads the store.
//! Short payloads are logged and skipped rather than erroring, since a
//! checksum-valid frame with a surprising shape is still just bus
//! traffic.

use crate::dispatch::DispatchTable;
use crate::protocol::actions::{ChlorinatorAction, ControllerAction, PumpAction};
use crate::protocol::{Frame, Protocol};
use crate::state::EquipmentState;
use crate::tracing::prelude::*;

/// Build the default registration table.
pub fn default_table() -> DispatchTable<EquipmentState, ()> {
    let mut table = DispatchTable::new();
    // Panel status traffic goes to the broadcast address, so it
    // classifies as Broadcast, not Controller.
    table.register(
        Protocol::Broadcast,
        ControllerAction::EquipmentStatus as u8,
        equipment_status,
    );
    table.register(
        Protocol::Broadcast,
        ControllerAction::ChlorinatorStatus as u8,
        chlorinator_broadcast,
    );
    table.register(Protocol::Controller, ControllerAction::Ack as u8, command_ack);
    table.register(Protocol::Pump, PumpAction::Status as u8, pump_status);
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::Ack as u8,
        command_ack,
    );
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::SaltReading as u8,
        salt_reading,
    );
    table.register(
        Protocol::Chlorinator,
        ChlorinatorAction::Model as u8,
        chlorinator_model,
    );
    table
}

/// Panel equipment-status broadcast: time and mode bytes.
fn equipment_status(frame: &Frame, state: &mut EquipmentState) {
    let p = &frame.payload;
    if p.len() < 10 {
        debug!("equipment status payload too short ({} bytes), skipping", p.len());
        return;
    }
    state.controller.hour = p[0];
    state.controller.minute = p[1];
    state.controller.mode = p[9];
}

/// Panel chlorinator broadcast: setpoints, salt, status, unit name.
fn chlorinator_broadcast(frame: &Frame, state: &mut EquipmentState) {
    let p = &frame.payload;
    if p.len() < 22 {
        debug!(
            "chlorinator broadcast payload too short ({} bytes), skipping",
            p.len()
        );
        return;
    }
    let chlor = &mut state.chlorinator;
    chlor.active = p[0] & 1 == 1;
    chlor.spa_setpoint_pct = p[0] >> 1;
    chlor.pool_setpoint_pct = p[1];
    chlor.salt_ppm = u32::from(p[3]) * 50;
    chlor.status = p[4] & 0x7f;
    chlor.model = Some(ascii_field(&p[6..22]));
}

/// Acks carry no state; the write queue consumes them for matching.
fn command_ack(frame: &Frame, _state: &mut EquipmentState) {
    trace!("ack from {} for action {:?}", frame.source, frame.payload.first());
}

/// 15-byte pump status reply.
fn pump_status(frame: &Frame, state: &mut EquipmentState) {
    let p = &frame.payload;
    if p.len() < 15 {
        debug!("pump status payload too short ({} bytes), skipping", p.len());
        return;
    }
    let pump = state.pump_mut(frame.source);
    pump.watts = u16::from_be_bytes([p[3], p[4]]);
    pump.rpm = u16::from_be_bytes([p[5], p[6]]);
    pump.flow_gpm = p[7];
    pump.status = u16::from_be_bytes([p[11], p[12]]);
}

/// Chlorinator salt reading: `[salt/50, status]`.
fn salt_reading(frame: &Frame, state: &mut EquipmentState) {
    let p = &frame.payload;
    if p.len() < 2 {
        debug!("salt reading payload too short ({} bytes), skipping", p.len());
        return;
    }
    state.chlorinator.salt_ppm = u32::from(p[0]) * 50;
    state.chlorinator.status = p[1] & 0x7f;
}

/// Chlorinator model string, ASCII at offset 1.
fn chlorinator_model(frame: &Frame, state: &mut EquipmentState) {
    let p = &frame.payload;
    if p.len() < 17 {
        debug!(
            "chlorinator model payload too short ({} bytes), skipping",
            p.len()
        );
        return;
    }
    state.chlorinator.model = Some(ascii_field(&p[1..17]));
}

fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect::<String>()
        .trim_end()
        .to_string()
}
