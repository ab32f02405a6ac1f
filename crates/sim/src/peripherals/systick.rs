// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, PeripheralTickResult};
use f1lab_hal::systick::{CSR_CLKSOURCE, CSR_COUNTFLAG, CSR_ENABLE, CSR_TICKINT, RELOAD_MAX};
use std::any::Any;

/// Core cycles per tick when CLKSOURCE selects the AHB/8 reference.
const EXTERNAL_DIVIDER: u32 = 8;

/// SysTick timer, ticked once per core cycle.
/// Standard address: 0xE000_E010
#[derive(Debug, Default, serde::Serialize)]
pub struct Systick {
    csr: u32,
    rvr: u32,
    cvr: u32,
    calib: u32,
    divider: u32,
}

impl Systick {
    pub fn new() -> Self {
        Self {
            csr: 0,
            rvr: 0,
            cvr: 0,
            // TENMS for a 72 MHz core on the 9 MHz reference.
            calib: 9000,
            divider: 0,
        }
    }

    pub fn current(&self) -> u32 {
        self.cvr
    }

    fn count(&mut self) -> bool {
        if self.cvr == 0 {
            self.cvr = self.rvr;
            return false;
        }
        self.cvr -= 1;
        if self.cvr == 0 {
            self.csr |= CSR_COUNTFLAG;
            return true;
        }
        false
    }
}

impl Peripheral for Systick {
    fn read(&mut self, offset: u32) -> u32 {
        let value = self.peek(offset);
        if offset == 0x00 {
            self.csr &= !CSR_COUNTFLAG;
        }
        value
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            0x00 => self.csr,
            0x04 => self.rvr,
            0x08 => self.cvr,
            0x0C => self.calib,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => {
                self.csr = (self.csr & CSR_COUNTFLAG)
                    | (value & (CSR_ENABLE | CSR_TICKINT | CSR_CLKSOURCE));
            }
            0x04 => {
                self.rvr = value & RELOAD_MAX;
            }
            0x08 => {
                self.cvr = 0;
                self.csr &= !CSR_COUNTFLAG;
            }
            _ => {}
        }
    }

    fn tick(&mut self) -> PeripheralTickResult {
        if (self.csr & CSR_ENABLE) == 0 {
            return PeripheralTickResult::default();
        }

        if self.csr & CSR_CLKSOURCE == 0 {
            self.divider += 1;
            if self.divider < EXTERNAL_DIVIDER {
                return PeripheralTickResult::default();
            }
            self.divider = 0;
        }

        let wrapped = self.count();
        PeripheralTickResult {
            irq: wrapped && (self.csr & CSR_TICKINT) != 0,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks_until_flag(st: &mut Systick, limit: u32) -> Option<u32> {
        (1..=limit).find(|_| {
            st.tick();
            st.peek(0x00) & CSR_COUNTFLAG != 0
        })
    }

    #[test]
    fn test_processor_clock_wraps_every_reload_plus_one() {
        let mut st = Systick::new();
        st.write(0x04, 9);
        st.write(0x08, 0);
        st.write(0x00, CSR_ENABLE | CSR_CLKSOURCE);

        assert_eq!(ticks_until_flag(&mut st, 100), Some(10));
        st.read(0x00);
        assert_eq!(ticks_until_flag(&mut st, 100), Some(10));
    }

    #[test]
    fn test_external_clock_divides_by_eight() {
        let mut st = Systick::new();
        st.write(0x04, 9);
        st.write(0x00, CSR_ENABLE);
        assert_eq!(ticks_until_flag(&mut st, 1000), Some(80));
    }

    #[test]
    fn test_countflag_clears_on_read() {
        let mut st = Systick::new();
        st.write(0x04, 1);
        st.write(0x00, CSR_ENABLE | CSR_CLKSOURCE);
        st.tick();
        st.tick();
        assert_ne!(st.read(0x00) & CSR_COUNTFLAG, 0);
        assert_eq!(st.read(0x00) & CSR_COUNTFLAG, 0);
    }

    #[test]
    fn test_tickint_raises_irq_on_wrap_only() {
        let mut st = Systick::new();
        st.write(0x04, 2);
        st.write(0x00, CSR_ENABLE | CSR_CLKSOURCE | CSR_TICKINT);
        let irqs: Vec<bool> = (0..6).map(|_| st.tick().irq).collect();
        assert_eq!(irqs, [false, false, true, false, false, true]);
    }

    #[test]
    fn test_cvr_write_clears_counter_and_flag() {
        let mut st = Systick::new();
        st.write(0x04, 1);
        st.write(0x00, CSR_ENABLE | CSR_CLKSOURCE);
        st.tick();
        st.tick();
        st.write(0x08, 0x1234);
        assert_eq!(st.peek(0x08), 0);
        assert_eq!(st.peek(0x00) & CSR_COUNTFLAG, 0);
    }
}
