// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Reset and clock control: the clock-enable step every program starts with.
//!
//! A peripheral's enable bit must be set before the first write to any of its
//! registers. Writes to an unclocked peripheral are lost.

use crate::bus::{Bus, Reg};
use bitflags::bitflags;

pub const RCC_BASE: u32 = 0x4002_1000;

pub const CR: Reg = Reg::at(RCC_BASE + 0x00);
pub const CFGR: Reg = Reg::at(RCC_BASE + 0x04);
pub const APB2ENR: Reg = Reg::at(RCC_BASE + 0x18);
pub const APB1ENR: Reg = Reg::at(RCC_BASE + 0x1C);

/// Reset value of the internal RC oscillator the programs run from.
pub const HSI_HZ: u32 = 8_000_000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Apb2: u32 {
        const AFIO = 1 << 0;
        const IOPA = 1 << 2;
        const IOPB = 1 << 3;
        const IOPC = 1 << 4;
        const IOPD = 1 << 5;
        const IOPE = 1 << 6;
        const ADC1 = 1 << 9;
        const ADC2 = 1 << 10;
        const TIM1 = 1 << 11;
        const SPI1 = 1 << 12;
        const USART1 = 1 << 14;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Apb1: u32 {
        const TIM2 = 1 << 0;
        const TIM3 = 1 << 1;
        const TIM4 = 1 << 2;
    }
}

/// One clock-enable bit, on whichever APB bus carries the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockGate {
    Apb1(Apb1),
    Apb2(Apb2),
}

impl ClockGate {
    fn reg_and_mask(self) -> (Reg, u32) {
        match self {
            ClockGate::Apb1(bits) => (APB1ENR, bits.bits()),
            ClockGate::Apb2(bits) => (APB2ENR, bits.bits()),
        }
    }
}

impl From<Apb1> for ClockGate {
    fn from(bits: Apb1) -> Self {
        ClockGate::Apb1(bits)
    }
}

impl From<Apb2> for ClockGate {
    fn from(bits: Apb2) -> Self {
        ClockGate::Apb2(bits)
    }
}

pub fn enable<B: Bus>(bus: &mut B, gate: impl Into<ClockGate>) {
    let (reg, mask) = gate.into().reg_and_mask();
    reg.set_bits(bus, mask);
}

pub fn disable<B: Bus>(bus: &mut B, gate: impl Into<ClockGate>) {
    let (reg, mask) = gate.into().reg_and_mask();
    reg.clear_bits(bus, mask);
}

pub fn is_enabled<B: Bus>(bus: &mut B, gate: impl Into<ClockGate>) -> bool {
    let (reg, mask) = gate.into().reg_and_mask();
    reg.read(bus) & mask == mask
}
