// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Core SysTick timer. Always clocked, no RCC gate.

use crate::bus::{Bus, Reg};

pub const SYSTICK_BASE: u32 = 0xE000_E010;

pub const CSR: Reg = Reg::at(SYSTICK_BASE + 0x00);
pub const RVR: Reg = Reg::at(SYSTICK_BASE + 0x04);
pub const CVR: Reg = Reg::at(SYSTICK_BASE + 0x08);
pub const CALIB: Reg = Reg::at(SYSTICK_BASE + 0x0C);

pub const CSR_ENABLE: u32 = 1 << 0;
pub const CSR_TICKINT: u32 = 1 << 1;
pub const CSR_CLKSOURCE: u32 = 1 << 2;
pub const CSR_COUNTFLAG: u32 = 1 << 16;

pub const RELOAD_MAX: u32 = 0x00FF_FFFF;

/// CLKSOURCE selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// AHB/8 reference clock.
    External,
    /// Processor clock.
    Processor,
}

impl ClockSource {
    pub const fn hz(self, core_hz: u32) -> u32 {
        match self {
            ClockSource::External => core_hz / 8,
            ClockSource::Processor => core_hz,
        }
    }
}

/// Stop, load `reload`, clear the current value, then start with the chosen
/// source. The counter wraps every `reload + 1` source ticks; COUNTFLAG and
/// the exception fire on each 1 -> 0 transition.
pub fn configure<B: Bus>(bus: &mut B, source: ClockSource, reload: u32, interrupt: bool) {
    CSR.write(bus, 0);
    RVR.write(bus, reload & RELOAD_MAX);
    CVR.write(bus, 0);
    let mut csr = CSR_ENABLE;
    if source == ClockSource::Processor {
        csr |= CSR_CLKSOURCE;
    }
    if interrupt {
        csr |= CSR_TICKINT;
    }
    CSR.write(bus, csr);
}

pub fn disable<B: Bus>(bus: &mut B) {
    CSR.clear_bits(bus, CSR_ENABLE | CSR_TICKINT);
}

/// Reads CSR, which clears COUNTFLAG in hardware.
pub fn has_wrapped<B: Bus>(bus: &mut B) -> bool {
    CSR.read(bus) & CSR_COUNTFLAG != 0
}

pub fn current<B: Bus>(bus: &mut B) -> u32 {
    CVR.read(bus) & RELOAD_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    #[test]
    fn test_configure_order_and_bits() {
        let mut bus = RecordingBus::default();
        configure(&mut bus, ClockSource::External, 200_000, true);
        assert_eq!(
            bus.writes,
            [
                (CSR.addr(), 0),
                (RVR.addr(), 200_000),
                (CVR.addr(), 0),
                (CSR.addr(), CSR_ENABLE | CSR_TICKINT),
            ]
        );
    }

    #[test]
    fn test_reload_is_truncated_to_24_bits() {
        let mut bus = RecordingBus::default();
        configure(&mut bus, ClockSource::Processor, 0x1FF_FFFF, false);
        assert_eq!(RVR.read(&mut bus), RELOAD_MAX);
        assert_eq!(CSR.read(&mut bus), CSR_ENABLE | CSR_CLKSOURCE);
    }
}
