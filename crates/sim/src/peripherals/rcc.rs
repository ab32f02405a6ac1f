// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Peripheral;
use f1lab_hal::rcc::ClockGate;
use std::any::Any;

const CR: u32 = 0x00;
const CFGR: u32 = 0x04;
const CIR: u32 = 0x08;
const APB2RSTR: u32 = 0x0C;
const APB1RSTR: u32 = 0x10;
const AHBENR: u32 = 0x14;
const APB2ENR: u32 = 0x18;
const APB1ENR: u32 = 0x1C;
const BDCR: u32 = 0x20;
const CSR: u32 = 0x24;

/// STM32F1 reset and clock control. Only the enable registers have an
/// effect: they gate the other peripheral models on the bus.
#[derive(Debug, serde::Serialize)]
pub struct Rcc {
    cr: u32,
    cfgr: u32,
    cir: u32,
    apb2rstr: u32,
    apb1rstr: u32,
    ahbenr: u32,
    apb2enr: u32,
    apb1enr: u32,
    bdcr: u32,
    csr: u32,
}

impl Rcc {
    pub fn new() -> Self {
        Self {
            // HSION, HSIRDY, HSITRIM = 16.
            cr: 0x0000_0083,
            cfgr: 0,
            cir: 0,
            apb2rstr: 0,
            apb1rstr: 0,
            // SRAM and FLITF clocks run from reset.
            ahbenr: 0x0000_0014,
            apb2enr: 0,
            apb1enr: 0,
            bdcr: 0,
            csr: 0x0C00_0000,
        }
    }

    pub fn is_enabled(&self, gate: ClockGate) -> bool {
        match gate {
            ClockGate::Apb1(bits) => self.apb1enr & bits.bits() == bits.bits(),
            ClockGate::Apb2(bits) => self.apb2enr & bits.bits() == bits.bits(),
        }
    }

    pub fn apb2enr(&self) -> u32 {
        self.apb2enr
    }

    pub fn apb1enr(&self) -> u32 {
        self.apb1enr
    }
}

impl Default for Rcc {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for Rcc {
    fn read(&mut self, offset: u32) -> u32 {
        self.peek(offset)
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            CR => self.cr,
            CFGR => self.cfgr,
            CIR => self.cir,
            APB2RSTR => self.apb2rstr,
            APB1RSTR => self.apb1rstr,
            AHBENR => self.ahbenr,
            APB2ENR => self.apb2enr,
            APB1ENR => self.apb1enr,
            BDCR => self.bdcr,
            CSR => self.csr,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            // Ready flags follow their enables immediately.
            CR => {
                let mut cr = value & 0x010D_00F9;
                if cr & 1 != 0 {
                    cr |= 1 << 1;
                }
                if cr & (1 << 16) != 0 {
                    cr |= 1 << 17;
                }
                if cr & (1 << 24) != 0 {
                    cr |= 1 << 25;
                }
                self.cr = cr;
            }
            CFGR => {
                // SWS mirrors SW.
                let sw = value & 0b11;
                self.cfgr = (value & !0b1100) | (sw << 2);
            }
            CIR => self.cir = value,
            APB2RSTR => self.apb2rstr = value,
            APB1RSTR => self.apb1rstr = value,
            AHBENR => self.ahbenr = value,
            APB2ENR => {
                tracing::debug!("RCC: APB2ENR {:#010x} -> {:#010x}", self.apb2enr, value);
                self.apb2enr = value;
            }
            APB1ENR => {
                tracing::debug!("RCC: APB1ENR {:#010x} -> {:#010x}", self.apb1enr, value);
                self.apb1enr = value;
            }
            BDCR => self.bdcr = value,
            CSR => self.csr = value,
            _ => {}
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
