// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Time-stamped record of what a run did to the outside world.

use f1lab_hal::gpio::Pin;
use f1lab_hal::vector::Exception;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

fn display<T: std::fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

/// A pad changed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinEvent {
    pub cycle: u64,
    #[serde(serialize_with = "display")]
    pub pin: Pin,
    pub high: bool,
}

/// A handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterruptEvent {
    pub cycle: u64,
    #[serde(serialize_with = "display")]
    pub exception: Exception,
}

/// Bounded event log. Once `limit` events of a kind are stored, later ones
/// are counted but dropped. Per-pin toggle counts are kept for every event,
/// stored or not.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pins: Vec<PinEvent>,
    interrupts: Vec<InterruptEvent>,
    dropped: u64,
    #[serde(skip)]
    toggles: BTreeMap<Pin, u64>,
    #[serde(skip)]
    limit: usize,
}

impl Default for Trace {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

impl Trace {
    pub const DEFAULT_LIMIT: usize = 1 << 16;

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pins: Vec::new(),
            interrupts: Vec::new(),
            dropped: 0,
            toggles: BTreeMap::new(),
            limit,
        }
    }

    pub fn record_pin(&mut self, event: PinEvent) {
        *self.toggles.entry(event.pin).or_insert(0) += 1;
        if self.pins.len() < self.limit {
            self.pins.push(event);
        } else {
            self.dropped += 1;
        }
    }

    pub fn record_interrupt(&mut self, event: InterruptEvent) {
        if self.interrupts.len() < self.limit {
            self.interrupts.push(event);
        } else {
            self.dropped += 1;
        }
    }

    pub fn pin_events(&self) -> &[PinEvent] {
        &self.pins
    }

    pub fn interrupts(&self) -> &[InterruptEvent] {
        &self.interrupts
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events_for(&self, pin: Pin) -> impl Iterator<Item = &PinEvent> + '_ {
        self.pins.iter().filter(move |e| e.pin == pin)
    }

    /// Number of level changes seen on `pin`, including dropped events.
    pub fn toggles(&self, pin: Pin) -> u64 {
        self.toggles.get(&pin).copied().unwrap_or(0)
    }

    /// Every pin that changed level, with its toggle count.
    pub fn toggled_pins(&self) -> impl Iterator<Item = (Pin, u64)> + '_ {
        self.toggles.iter().map(|(&pin, &count)| (pin, count))
    }

    /// Cycles between consecutive level changes on `pin`.
    pub fn intervals(&self, pin: Pin) -> Vec<u64> {
        let cycles: Vec<u64> = self.events_for(pin).map(|e| e.cycle).collect();
        cycles.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Cycles spent high and low between the first and last change on `pin`.
    pub fn duty(&self, pin: Pin) -> (u64, u64) {
        let events: Vec<&PinEvent> = self.events_for(pin).collect();
        events.windows(2).fold((0, 0), |(high, low), w| {
            let span = w[1].cycle - w[0].cycle;
            if w[0].high {
                (high + span, low)
            } else {
                (high, low + span)
            }
        })
    }

    pub fn clear(&mut self) {
        self.pins.clear();
        self.interrupts.clear();
        self.toggles.clear();
        self.dropped = 0;
    }
}
