//! Shared equipment-state store.
//!
//! Handlers write raw decoded fields here; nothing in this crate reads
//! them back or interprets them. The store serializes to JSON for the
//! replay tool's state dump.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub type SharedState = Arc<RwLock<EquipmentState>>;

pub fn shared() -> SharedState {
    Arc::new(RwLock::new(EquipmentState::default()))
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct EquipmentState {
    pub controller: ControllerState,
    pub chlorinator: ChlorinatorState,
    /// Keyed by bus address (96..=111).
    pub pumps: BTreeMap<u8, PumpState>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ControllerState {
    pub hour: u8,
    pub minute: u8,
    pub mode: u8,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ChlorinatorState {
    pub active: bool,
    pub pool_setpoint_pct: u8,
    pub spa_setpoint_pct: u8,
    pub salt_ppm: u32,
    pub status: u8,
    pub model: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PumpState {
    pub watts: u16,
    pub rpm: u16,
    pub flow_gpm: u8,
    pub status: u16,
}

impl EquipmentState {
    /// Pump slot for a bus address, created on first sighting.
    pub fn pump_mut(&mut self, addr: u8) -> &mut PumpState {
        self.pumps.entry(addr).or_default()
    }
}
