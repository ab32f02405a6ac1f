// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Alternate-function remapping. Needs `Apb2::AFIO` clocked.

use crate::bus::{Bus, Reg};

pub const AFIO_BASE: u32 = 0x4001_0000;

pub const EVCR: Reg = Reg::at(AFIO_BASE + 0x00);
pub const MAPR: Reg = Reg::at(AFIO_BASE + 0x04);

const TIM3_REMAP_SHIFT: u32 = 10;

/// TIM3 channel routing (MAPR bits 11:10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tim3Remap {
    /// CH1..4 on PA6, PA7, PB0, PB1.
    None = 0b00,
    /// CH1..4 on PB4, PB5, PB0, PB1.
    Partial = 0b10,
    /// CH1..4 on PC6, PC7, PC8, PC9.
    Full = 0b11,
}

impl Tim3Remap {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b10 => Tim3Remap::Partial,
            0b11 => Tim3Remap::Full,
            // 0b01 is reserved.
            _ => Tim3Remap::None,
        }
    }
}

pub fn remap_tim3<B: Bus>(bus: &mut B, remap: Tim3Remap) {
    MAPR.write_field(bus, TIM3_REMAP_SHIFT, 2, remap as u32);
}

pub fn tim3_remap<B: Bus>(bus: &mut B) -> Tim3Remap {
    Tim3Remap::from_bits(MAPR.read_field(bus, TIM3_REMAP_SHIFT, 2))
}
