// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, PeripheralTickResult};
use f1lab_hal::adc::{
    SampleTime, CR2_ADON, CR2_ALIGN, CR2_CAL, CR2_CONT, CR2_EXTSEL_SHIFT, CR2_EXTTRIG,
    CR2_RSTCAL, CR2_SWSTART, EXTSEL_SWSTART, MAX_SAMPLE, SR_EOC, SR_STRT,
};
use std::any::Any;

const SR: u32 = 0x00;
const CR1: u32 = 0x04;
const CR2: u32 = 0x08;
const SMPR1: u32 = 0x0C;
const SMPR2: u32 = 0x10;
const SQR1: u32 = 0x2C;
const SQR2: u32 = 0x30;
const SQR3: u32 = 0x34;
const DR: u32 = 0x4C;

const CR1_EOCIE: u32 = 1 << 5;

/// Core cycles per ADC clock cycle (ADCPRE = /2).
pub const ADC_CLOCK_DIVIDER: u32 = 2;
/// Core cycles for the calibration register reset.
pub const RSTCAL_CYCLES: u32 = 2 * ADC_CLOCK_DIVIDER;
/// Core cycles for self-calibration.
pub const CAL_CYCLES: u32 = 83 * ADC_CLOCK_DIVIDER;

/// Number of analog inputs: sixteen pins plus temperature sensor and VREFINT.
pub const CHANNELS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
enum Phase {
    Idle,
    ResetCalibration(u32),
    Calibration(u32),
    Converting { channel: u8, remaining: u32 },
}

/// STM32F1 ADC, regular group of one conversion.
///
/// Samples come from `inputs`, set by whoever drives the analog pads.
#[derive(Debug, serde::Serialize)]
pub struct Adc {
    sr: u32,
    cr1: u32,
    cr2: u32,
    smpr1: u32,
    smpr2: u32,
    sqr1: u32,
    sqr2: u32,
    sqr3: u32,
    dr: u32,
    inputs: [u16; CHANNELS],
    phase: Phase,
    conversions: u64,
}

impl Adc {
    pub fn new() -> Self {
        Self {
            sr: 0,
            cr1: 0,
            cr2: 0,
            smpr1: 0,
            smpr2: 0,
            sqr1: 0,
            sqr2: 0,
            sqr3: 0,
            dr: 0,
            inputs: [0; CHANNELS],
            phase: Phase::Idle,
            conversions: 0,
        }
    }

    /// Drive `channel` with a 12-bit sample. Values above full scale clip.
    pub fn set_input(&mut self, channel: u8, value: u16) {
        if let Some(input) = self.inputs.get_mut(channel as usize) {
            *input = value.min(MAX_SAMPLE);
        }
    }

    pub fn input(&self, channel: u8) -> Option<u16> {
        self.inputs.get(channel as usize).copied()
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    pub fn is_converting(&self) -> bool {
        matches!(self.phase, Phase::Converting { .. })
    }

    fn powered(&self) -> bool {
        self.cr2 & CR2_ADON != 0
    }

    fn software_trigger(&self) -> bool {
        self.cr2 & CR2_EXTTRIG != 0 && (self.cr2 >> CR2_EXTSEL_SHIFT) & 0b111 == EXTSEL_SWSTART
    }

    fn sample_time(&self, channel: u8) -> SampleTime {
        let channel = channel as u32;
        if channel < 10 {
            SampleTime::from_bits(self.smpr2 >> (3 * channel))
        } else {
            SampleTime::from_bits(self.smpr1 >> (3 * (channel - 10)))
        }
    }

    fn start_conversion(&mut self) {
        let channel = (self.sqr3 & 0x1F) as u8;
        let remaining = self.sample_time(channel).conversion_cycles() * ADC_CLOCK_DIVIDER;
        tracing::trace!("ADC: converting channel {} over {} cycles", channel, remaining);
        self.sr |= SR_STRT;
        self.phase = Phase::Converting { channel, remaining };
    }

    fn finish_conversion(&mut self, channel: u8) {
        let sample = self.input(channel).unwrap_or(0) as u32;
        self.dr = if self.cr2 & CR2_ALIGN != 0 {
            sample << 4
        } else {
            sample
        };
        self.sr |= SR_EOC;
        self.conversions += 1;
        self.phase = Phase::Idle;
        if self.cr2 & CR2_CONT != 0 && self.powered() {
            self.start_conversion();
        }
    }
}

impl Default for Adc {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for Adc {
    fn read(&mut self, offset: u32) -> u32 {
        let value = self.peek(offset);
        if offset == DR {
            self.sr &= !SR_EOC;
        }
        value
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            SR => self.sr,
            CR1 => self.cr1,
            CR2 => self.cr2,
            SMPR1 => self.smpr1,
            SMPR2 => self.smpr2,
            SQR1 => self.sqr1,
            SQR2 => self.sqr2,
            SQR3 => self.sqr3,
            DR => self.dr,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            // Status flags are rc_w0.
            SR => self.sr &= value & 0x1F,
            CR1 => self.cr1 = value & 0x00CF_FFFF,
            CR2 => {
                let was_on = self.powered();
                let previous = self.cr2;
                self.cr2 = value & 0x00FE_F90F;

                if !self.powered() {
                    if was_on {
                        tracing::debug!("ADC: powered down");
                    }
                    self.phase = Phase::Idle;
                    self.cr2 &= !(CR2_CAL | CR2_RSTCAL | CR2_SWSTART);
                    return;
                }
                if !was_on {
                    tracing::debug!("ADC: powered up");
                    return;
                }

                if value & CR2_RSTCAL != 0 && previous & CR2_RSTCAL == 0 {
                    self.phase = Phase::ResetCalibration(RSTCAL_CYCLES);
                } else if value & CR2_CAL != 0 && previous & CR2_CAL == 0 {
                    self.phase = Phase::Calibration(CAL_CYCLES);
                } else if value & CR2_SWSTART != 0 && self.software_trigger() {
                    self.cr2 &= !CR2_SWSTART;
                    self.start_conversion();
                } else if (value ^ previous) & !CR2_SWSTART == 0 {
                    // ADON written again with nothing else changed.
                    self.start_conversion();
                }
            }
            SMPR1 => self.smpr1 = value & 0x00FF_FFFF,
            SMPR2 => self.smpr2 = value & 0x3FFF_FFFF,
            SQR1 => self.sqr1 = value & 0x00FF_FFFF,
            SQR2 => self.sqr2 = value & 0x3FFF_FFFF,
            SQR3 => self.sqr3 = value & 0x3FFF_FFFF,
            _ => {}
        }
    }

    fn tick(&mut self) -> PeripheralTickResult {
        match self.phase {
            Phase::Idle => {}
            Phase::ResetCalibration(n) if n <= 1 => {
                self.cr2 &= !CR2_RSTCAL;
                self.phase = Phase::Idle;
            }
            Phase::ResetCalibration(n) => self.phase = Phase::ResetCalibration(n - 1),
            Phase::Calibration(n) if n <= 1 => {
                tracing::debug!("ADC: calibration complete");
                self.cr2 &= !CR2_CAL;
                self.phase = Phase::Idle;
            }
            Phase::Calibration(n) => self.phase = Phase::Calibration(n - 1),
            Phase::Converting { channel, remaining } if remaining <= 1 => {
                self.finish_conversion(channel)
            }
            Phase::Converting { channel, remaining } => {
                self.phase = Phase::Converting {
                    channel,
                    remaining: remaining - 1,
                }
            }
        }

        PeripheralTickResult {
            irq: self.sr & SR_EOC != 0 && self.cr1 & CR1_EOCIE != 0,
            ..Default::default()
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
