// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Pin transitions of a finished run as a VCD waveform, one 1-bit wire per
//! pad that changed level.

use f1lab_hal::gpio::Pin;
use f1lab_sim::trace::Trace;
use std::collections::BTreeMap;
use std::io::Write;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

fn cycles_to_ns(cycles: u64, core_hz: u32) -> u64 {
    (cycles as u128 * 1_000_000_000 / core_hz.max(1) as u128) as u64
}

fn level(high: bool) -> Value {
    if high {
        Value::V1
    } else {
        Value::V0
    }
}

/// Timestamps are nanoseconds of simulated time; the dump ends at
/// `end_cycle`.
pub fn write_pins<W: Write>(out: W, trace: &Trace, core_hz: u32, end_cycle: u64) -> anyhow::Result<()> {
    let mut writer = Writer::new(out);
    writer.timescale(1, TimescaleUnit::NS)?;
    writer.add_module("f1lab")?;

    let mut ids: BTreeMap<Pin, IdCode> = BTreeMap::new();
    for event in trace.pin_events() {
        if !ids.contains_key(&event.pin) {
            let id = writer.add_wire(1, &event.pin.to_string())?;
            ids.insert(event.pin, id);
        }
    }
    writer.upscope()?;
    writer.enddefinitions()?;

    // Level before each pad's first transition.
    writer.timestamp(0)?;
    for (pin, id) in &ids {
        if let Some(first) = trace.events_for(*pin).next() {
            writer.change_scalar(*id, level(!first.high))?;
        }
    }

    let mut now = 0;
    for event in trace.pin_events() {
        let Some(id) = ids.get(&event.pin) else {
            continue;
        };
        let t = cycles_to_ns(event.cycle, core_hz);
        if t != now {
            writer.timestamp(t)?;
            now = t;
        }
        writer.change_scalar(*id, level(event.high))?;
    }

    let end = cycles_to_ns(end_cycle, core_hz);
    if end > now {
        writer.timestamp(end)?;
    }
    Ok(())
}
