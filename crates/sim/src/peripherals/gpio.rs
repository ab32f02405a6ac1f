// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Peripheral;
use f1lab_hal::gpio::PinMode;
use std::any::Any;

const CRL: u32 = 0x00;
const CRH: u32 = 0x04;
const IDR: u32 = 0x08;
const ODR: u32 = 0x0C;
const BSRR: u32 = 0x10;
const BRR: u32 = 0x14;
const LCKR: u32 = 0x18;

const LCKK: u32 = 1 << 16;

/// STM32F1 GPIO port (CRL/CRH layout).
///
/// The pad level of each pin comes from ODR in output mode, from the
/// routed peripheral in alternate-function mode and from the external
/// input otherwise. IDR samples the pads.
#[derive(Debug, Default, serde::Serialize)]
pub struct GpioPort {
    crl: u32,
    crh: u32,
    odr: u32,
    lckr: u32,
    /// Levels driven onto the pads from outside the chip.
    inputs: u16,
    /// Levels driven by peripherals on pins in alternate-function mode.
    alternate: u16,
    lock_stage: u8,
}

impl GpioPort {
    pub fn new() -> Self {
        Self {
            // Reset value: floating input
            crl: 0x4444_4444,
            crh: 0x4444_4444,
            ..Default::default()
        }
    }

    pub fn odr(&self) -> u16 {
        self.odr as u16
    }

    pub fn mode(&self, pin: u8) -> PinMode {
        let (reg, shift) = if pin < 8 {
            (self.crl, 4 * pin as u32)
        } else {
            (self.crh, 4 * (pin as u32 - 8))
        };
        PinMode::from_nibble((reg >> shift) & 0xF)
    }

    /// Pad levels of all sixteen pins.
    pub fn levels(&self) -> u16 {
        let mut levels = 0u16;
        for pin in 0..16u8 {
            let bit = 1u16 << pin;
            let mode = self.mode(pin);
            let high = if mode.is_output() {
                self.odr as u16 & bit != 0
            } else if mode.is_alternate() {
                self.alternate & bit != 0
            } else {
                self.inputs & bit != 0
            };
            if high {
                levels |= bit;
            }
        }
        levels
    }

    pub fn level(&self, pin: u8) -> bool {
        self.levels() & (1 << pin) != 0
    }

    pub fn set_input(&mut self, pin: u8, high: bool) {
        if high {
            self.inputs |= 1 << pin;
        } else {
            self.inputs &= !(1 << pin);
        }
    }

    pub fn set_alternate(&mut self, pin: u8, high: bool) {
        if high {
            self.alternate |= 1 << pin;
        } else {
            self.alternate &= !(1 << pin);
        }
    }

    fn is_locked(&self) -> bool {
        self.lckr & LCKK != 0
    }

    /// Writes to CRL/CRH keep the nibbles of locked pins.
    fn write_config(current: u32, value: u32, locked_pins: u32) -> u32 {
        let mut mask = 0u32;
        for i in 0..8 {
            if locked_pins & (1 << i) != 0 {
                mask |= 0xF << (4 * i);
            }
        }
        (current & mask) | (value & !mask)
    }

    /// LCKR key sequence: write 1, write 0, write 1, read 0, read 1.
    fn write_lckr(&mut self, value: u32) {
        if self.is_locked() {
            return;
        }
        let key = value & LCKK != 0;
        self.lock_stage = match (self.lock_stage, key) {
            (0, true) => 1,
            (1, false) => 2,
            (2, true) => 3,
            (_, true) => 1,
            _ => 0,
        };
        self.lckr = (self.lckr & LCKK) | (value & 0xFFFF);
    }
}

impl Peripheral for GpioPort {
    fn read(&mut self, offset: u32) -> u32 {
        if offset == LCKR && self.lock_stage >= 3 {
            // Two reads complete the key sequence.
            if self.lock_stage == 3 {
                self.lock_stage = 4;
                return self.lckr;
            }
            self.lock_stage = 0;
            self.lckr |= LCKK;
            tracing::debug!("GPIO: configuration locked, pins {:#06x}", self.lckr & 0xFFFF);
            return self.lckr;
        }
        self.peek(offset)
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            CRL => self.crl,
            CRH => self.crh,
            IDR => self.levels() as u32,
            ODR => self.odr,
            LCKR => self.lckr,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            CRL => {
                let locked = if self.is_locked() { self.lckr & 0xFF } else { 0 };
                self.crl = Self::write_config(self.crl, value, locked);
            }
            CRH => {
                let locked = if self.is_locked() {
                    (self.lckr >> 8) & 0xFF
                } else {
                    0
                };
                self.crh = Self::write_config(self.crh, value, locked);
            }
            ODR => self.odr = value & 0xFFFF,
            BSRR => {
                // BSRR: set bits win over reset bits
                let set = value & 0xFFFF;
                let reset = (value >> 16) & 0xFFFF;
                self.odr = (self.odr & !reset) | set;
            }
            BRR => {
                let reset = value & 0xFFFF;
                self.odr &= !reset;
            }
            LCKR => self.write_lckr(value),
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
        serde_json::json!({
            "crl": self.crl,
            "crh": self.crh,
            "idr": self.levels(),
            "odr": self.odr,
            "lckr": self.lckr,
        })
    }
}
