// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Exception numbering and the handler table used off-target.
//!
//! On the chip the table is emitted by the linker and never changes. Host
//! backends get the same layout as a [`VectorTable`] filled once during
//! setup and read from then on.

use core::fmt;
use core::str::FromStr;

use crate::nvic::irq;

/// Entries 0..16: stack pointer, reset and the core exceptions.
pub const CORE_VECTORS: usize = 16;
/// Device interrupt lines of the medium-density F103.
pub const DEVICE_VECTORS: usize = 60;
pub const VECTOR_COUNT: usize = CORE_VECTORS + DEVICE_VECTORS;

/// A slot in the vector table, by exception number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Exception {
    Reset,
    Nmi,
    HardFault,
    MemManage,
    BusFault,
    UsageFault,
    SvCall,
    DebugMonitor,
    PendSv,
    SysTick,
    /// Device interrupt line `n`, table entry `16 + n`.
    Irq(u8),
}

impl Exception {
    pub const fn number(self) -> usize {
        match self {
            Exception::Reset => 1,
            Exception::Nmi => 2,
            Exception::HardFault => 3,
            Exception::MemManage => 4,
            Exception::BusFault => 5,
            Exception::UsageFault => 6,
            Exception::SvCall => 11,
            Exception::DebugMonitor => 12,
            Exception::PendSv => 14,
            Exception::SysTick => 15,
            Exception::Irq(n) => CORE_VECTORS + n as usize,
        }
    }

    pub const fn from_number(number: usize) -> Option<Self> {
        Some(match number {
            1 => Exception::Reset,
            2 => Exception::Nmi,
            3 => Exception::HardFault,
            4 => Exception::MemManage,
            5 => Exception::BusFault,
            6 => Exception::UsageFault,
            11 => Exception::SvCall,
            12 => Exception::DebugMonitor,
            14 => Exception::PendSv,
            15 => Exception::SysTick,
            n if n >= CORE_VECTORS && n < VECTOR_COUNT => Exception::Irq((n - CORE_VECTORS) as u8),
            _ => return None,
        })
    }
}

/// Names accepted by `FromStr` and printed by `Display`.
const NAMES: [(&str, Exception); 14] = [
    ("Reset", Exception::Reset),
    ("NMI", Exception::Nmi),
    ("HardFault", Exception::HardFault),
    ("MemManage", Exception::MemManage),
    ("BusFault", Exception::BusFault),
    ("UsageFault", Exception::UsageFault),
    ("SVCall", Exception::SvCall),
    ("DebugMonitor", Exception::DebugMonitor),
    ("PendSV", Exception::PendSv),
    ("SysTick", Exception::SysTick),
    ("ADC1_2", Exception::Irq(irq::ADC1_2)),
    ("TIM2", Exception::Irq(irq::TIM2)),
    ("TIM3", Exception::Irq(irq::TIM3)),
    ("TIM4", Exception::Irq(irq::TIM4)),
];

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match NAMES.iter().find(|(_, e)| e == self) {
            Some((name, _)) => f.write_str(name),
            None => match self {
                Exception::Irq(n) => write!(f, "IRQ{}", n),
                _ => write!(f, "#{}", self.number()),
            },
        }
    }
}

/// Case-insensitive names, plus `IRQ<n>` for any device line.
impl FromStr for Exception {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((_, e)) = NAMES.iter().find(|(name, _)| name.eq_ignore_ascii_case(s)) {
            return Ok(*e);
        }
        let digits = s
            .strip_prefix("IRQ")
            .or_else(|| s.strip_prefix("irq"))
            .ok_or(())?;
        let n: u8 = digits.parse().map_err(|_| ())?;
        if (n as usize) < DEVICE_VECTORS {
            Ok(Exception::Irq(n))
        } else {
            Err(())
        }
    }
}

/// An interrupt handler run against the bus it interrupted.
pub type Handler<B> = fn(&mut B);

/// Fixed-size handler table indexed by exception number.
pub struct VectorTable<B> {
    slots: [Option<Handler<B>>; VECTOR_COUNT],
}

impl<B> VectorTable<B> {
    pub const fn new() -> Self {
        Self {
            slots: [None; VECTOR_COUNT],
        }
    }

    /// Replaces whatever handler the slot held.
    pub fn register(&mut self, exception: Exception, handler: Handler<B>) {
        if let Some(slot) = self.slots.get_mut(exception.number()) {
            *slot = Some(handler);
        }
    }

    pub fn get(&self, exception: Exception) -> Option<Handler<B>> {
        self.slots.get(exception.number()).copied().flatten()
    }

    pub fn is_registered(&self, exception: Exception) -> bool {
        self.get(exception).is_some()
    }

    /// Runs the slot's handler once. Returns false for an empty slot.
    pub fn dispatch(&self, exception: Exception, bus: &mut B) -> bool {
        match self.get(exception) {
            Some(handler) => {
                handler(bus);
                true
            }
            None => false,
        }
    }

    /// Occupied slots in ascending exception number.
    pub fn registered(&self) -> impl Iterator<Item = Exception> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(n, _)| Exception::from_number(n))
    }
}

impl<B> Default for VectorTable<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Clone for VectorTable<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for VectorTable<B> {}

impl<B> fmt::Debug for VectorTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered()).finish()
    }
}
