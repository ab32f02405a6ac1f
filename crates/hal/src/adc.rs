// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! ADC1, single regular conversion started by software.

use crate::bus::{Bus, Reg};

pub const ADC1_BASE: u32 = 0x4001_2400;

pub const SR: Reg = Reg::at(ADC1_BASE + 0x00);
pub const CR1: Reg = Reg::at(ADC1_BASE + 0x04);
pub const CR2: Reg = Reg::at(ADC1_BASE + 0x08);
pub const SMPR1: Reg = Reg::at(ADC1_BASE + 0x0C);
pub const SMPR2: Reg = Reg::at(ADC1_BASE + 0x10);
pub const SQR1: Reg = Reg::at(ADC1_BASE + 0x2C);
pub const SQR2: Reg = Reg::at(ADC1_BASE + 0x30);
pub const SQR3: Reg = Reg::at(ADC1_BASE + 0x34);
pub const DR: Reg = Reg::at(ADC1_BASE + 0x4C);

pub const SR_AWD: u32 = 1 << 0;
pub const SR_EOC: u32 = 1 << 1;
pub const SR_STRT: u32 = 1 << 4;

pub const CR2_ADON: u32 = 1 << 0;
pub const CR2_CONT: u32 = 1 << 1;
pub const CR2_CAL: u32 = 1 << 2;
pub const CR2_RSTCAL: u32 = 1 << 3;
pub const CR2_ALIGN: u32 = 1 << 11;
pub const CR2_EXTSEL_SHIFT: u32 = 17;
pub const CR2_EXTTRIG: u32 = 1 << 20;
pub const CR2_SWSTART: u32 = 1 << 22;

/// EXTSEL value selecting the SWSTART bit as trigger.
pub const EXTSEL_SWSTART: u32 = 0b111;

/// Full-scale 12-bit sample.
pub const MAX_SAMPLE: u16 = 0x0FFF;

/// SMPx values, in ADC clock cycles spent sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTime {
    Cycles1_5 = 0,
    Cycles7_5 = 1,
    Cycles13_5 = 2,
    Cycles28_5 = 3,
    Cycles41_5 = 4,
    Cycles55_5 = 5,
    Cycles71_5 = 6,
    Cycles239_5 = 7,
}

impl SampleTime {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => SampleTime::Cycles1_5,
            1 => SampleTime::Cycles7_5,
            2 => SampleTime::Cycles13_5,
            3 => SampleTime::Cycles28_5,
            4 => SampleTime::Cycles41_5,
            5 => SampleTime::Cycles55_5,
            6 => SampleTime::Cycles71_5,
            _ => SampleTime::Cycles239_5,
        }
    }

    /// Sampling plus the fixed 12.5 cycles of successive approximation.
    pub const fn conversion_cycles(self) -> u32 {
        match self {
            SampleTime::Cycles1_5 => 14,
            SampleTime::Cycles7_5 => 20,
            SampleTime::Cycles13_5 => 26,
            SampleTime::Cycles28_5 => 41,
            SampleTime::Cycles41_5 => 54,
            SampleTime::Cycles55_5 => 68,
            SampleTime::Cycles71_5 => 84,
            SampleTime::Cycles239_5 => 252,
        }
    }
}

/// One conversion of `channel`, software trigger, single mode, right aligned,
/// then power on. The analog pin must already be in analog mode.
pub fn configure_single<B: Bus>(bus: &mut B, channel: u8) {
    CR1.write(bus, 0);
    SQR1.write(bus, 0);
    SQR3.write(bus, channel as u32 & 0x1F);
    CR2.modify(bus, |v| {
        (v | (EXTSEL_SWSTART << CR2_EXTSEL_SHIFT) | CR2_EXTTRIG | CR2_ADON) & !(CR2_CONT | CR2_ALIGN)
    });
}

pub fn set_sample_time<B: Bus>(bus: &mut B, channel: u8, time: SampleTime) {
    let channel = channel as u32;
    if channel < 10 {
        SMPR2.write_field(bus, 3 * channel, 3, time as u32);
    } else {
        SMPR1.write_field(bus, 3 * (channel - 10), 3, time as u32);
    }
}

/// Reset the calibration registers, then self-calibrate. Spins until the
/// hardware clears each bit.
pub fn calibrate<B: Bus>(bus: &mut B) {
    CR2.set_bits(bus, CR2_RSTCAL);
    while CR2.is_set(bus, CR2_RSTCAL) {
        bus.idle();
    }
    CR2.set_bits(bus, CR2_CAL);
    while CR2.is_set(bus, CR2_CAL) {
        bus.idle();
    }
}

pub fn start<B: Bus>(bus: &mut B) {
    CR2.set_bits(bus, CR2_SWSTART);
}

pub fn is_complete<B: Bus>(bus: &mut B) -> bool {
    SR.is_set(bus, SR_EOC)
}

/// Lower half of DR. Reading it clears EOC.
pub fn data<B: Bus>(bus: &mut B) -> u16 {
    (DR.read(bus) & 0xFFFF) as u16
}

/// Start, wait for STRT then EOC, return the sample.
pub fn read_blocking<B: Bus>(bus: &mut B) -> u16 {
    start(bus);
    while !SR.is_set(bus, SR_STRT) {
        bus.idle();
    }
    while !is_complete(bus) {
        bus.idle();
    }
    data(bus)
}

pub fn clear_status<B: Bus>(bus: &mut B) {
    SR.write(bus, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    #[test]
    fn test_configure_single_channel7() {
        let mut bus = RecordingBus::default();
        CR2.write(&mut bus, CR2_CONT);
        configure_single(&mut bus, 7);
        assert_eq!(SQR3.read(&mut bus), 7);
        assert_eq!(SQR1.read(&mut bus), 0);
        assert_eq!(CR2.read(&mut bus), (7 << 17) | (1 << 20) | 1);
    }

    #[test]
    fn test_sample_time_fields() {
        let mut bus = RecordingBus::default();
        set_sample_time(&mut bus, 7, SampleTime::Cycles239_5);
        set_sample_time(&mut bus, 11, SampleTime::Cycles7_5);
        assert_eq!(SMPR2.read(&mut bus), 7 << 21);
        assert_eq!(SMPR1.read(&mut bus), 1 << 3);
    }

    #[test]
    fn test_read_blocking_returns_low_half_of_dr() {
        let mut bus = RecordingBus::default();
        SR.write(&mut bus, SR_STRT | SR_EOC);
        DR.write(&mut bus, 0x0001_07FF);
        assert_eq!(read_blocking(&mut bus), 0x07FF);
        assert_eq!(bus.idles, 0);
    }
}
