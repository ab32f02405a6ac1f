// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::{Bus, Reg};

pub const NVIC_BASE: u32 = 0xE000_E100;

pub const ISER: u32 = NVIC_BASE + 0x000;
pub const ICER: u32 = NVIC_BASE + 0x080;
pub const ISPR: u32 = NVIC_BASE + 0x100;
pub const ICPR: u32 = NVIC_BASE + 0x180;
pub const IPR: u32 = NVIC_BASE + 0x300;

/// Device interrupt lines used by the programs.
pub mod irq {
    pub const TIM2: u8 = 28;
    pub const TIM3: u8 = 29;
    pub const TIM4: u8 = 30;
    pub const ADC1_2: u8 = 18;
}

const fn bank(base: u32, irq: u8) -> (Reg, u32) {
    (Reg::at(base + 4 * (irq as u32 / 32)), 1 << (irq % 32))
}

/// ISER is write-1-to-set: the other lines are not touched.
pub fn enable<B: Bus>(bus: &mut B, irq: u8) {
    let (reg, bit) = bank(ISER, irq);
    reg.write(bus, bit);
}

pub fn disable<B: Bus>(bus: &mut B, irq: u8) {
    let (reg, bit) = bank(ICER, irq);
    reg.write(bus, bit);
}

pub fn is_enabled<B: Bus>(bus: &mut B, irq: u8) -> bool {
    let (reg, bit) = bank(ISER, irq);
    reg.is_set(bus, bit)
}

pub fn pend<B: Bus>(bus: &mut B, irq: u8) {
    let (reg, bit) = bank(ISPR, irq);
    reg.write(bus, bit);
}

pub fn unpend<B: Bus>(bus: &mut B, irq: u8) {
    let (reg, bit) = bank(ICPR, irq);
    reg.write(bus, bit);
}

pub fn is_pending<B: Bus>(bus: &mut B, irq: u8) -> bool {
    let (reg, bit) = bank(ISPR, irq);
    reg.is_set(bus, bit)
}

/// One priority byte per line; the F103 implements the top four bits.
pub fn set_priority<B: Bus>(bus: &mut B, irq: u8, priority: u8) {
    let addr = IPR + (irq as u32 & !3);
    let shift = 8 * (irq as u32 % 4);
    Reg::at(addr).write_field(bus, shift, 8, priority as u32);
}

pub fn priority<B: Bus>(bus: &mut B, irq: u8) -> u8 {
    let addr = IPR + (irq as u32 & !3);
    let shift = 8 * (irq as u32 % 4);
    Reg::at(addr).read_field(bus, shift, 8) as u8
}
