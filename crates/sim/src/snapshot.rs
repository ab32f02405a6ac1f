// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BusSnapshot {
    pub cycles: u64,
    pub core_hz: u32,
    pub peripherals: Vec<PeripheralSnapshot>,
    /// Handler runs by exception name.
    pub interrupts: BTreeMap<String, u64>,
    /// Pad levels by port letter, bit n for pin n.
    pub pins: BTreeMap<String, u16>,
    pub stats: BusStats,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PeripheralSnapshot {
    pub name: String,
    pub base: u32,
    pub clocked: bool,
    pub state: serde_json::Value,
}

/// Accesses and events the bus absorbed instead of failing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub unmapped_reads: u64,
    pub unmapped_writes: u64,
    pub gated_reads: u64,
    pub gated_writes: u64,
    /// Pending exceptions cleared without a handler to run.
    pub unhandled: u64,
}

impl BusSnapshot {
    pub fn peripheral(&self, name: &str) -> Option<&PeripheralSnapshot> {
        self.peripherals.iter().find(|p| p.name == name)
    }
}
