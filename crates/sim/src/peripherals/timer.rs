// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, PeripheralTickResult};
use f1lab_hal::tim::{CR1_ARPE, CR1_CEN, EGR_UG, OCM_PWM1, OCM_PWM2, SR_UIF};
use std::any::Any;

const CR1: u32 = 0x00;
const CR2: u32 = 0x04;
const SMCR: u32 = 0x08;
const DIER: u32 = 0x0C;
const SR: u32 = 0x10;
const EGR: u32 = 0x14;
const CCMR1: u32 = 0x18;
const CCMR2: u32 = 0x1C;
const CCER: u32 = 0x20;
const CNT: u32 = 0x24;
const PSC: u32 = 0x28;
const ARR: u32 = 0x2C;
const CCR1: u32 = 0x34;
const CCR4: u32 = 0x40;

/// Interrupt-capable SR flags: UIF and CC1IF..CC4IF.
const IRQ_FLAGS: u32 = 0x1F;

/// STM32F1 general-purpose timer (TIM2..TIM4), upcounting, internal clock.
///
/// The counter counts `0..ARR`; the tick that would reach ARR produces the
/// update event instead, so one period is `(PSC + 1) * ARR` timer clocks.
/// PSC always goes through its shadow register; ARR and CCRx do when ARPE or
/// OCxPE is set.
#[derive(Debug, serde::Serialize)]
pub struct Timer {
    cr1: u32,
    cr2: u32,
    smcr: u32,
    dier: u32,
    sr: u32,
    ccmr1: u32,
    ccmr2: u32,
    ccer: u32,
    cnt: u32,
    psc: u32,
    arr: u32,
    ccr: [u32; 4],

    // Shadow registers and prescaler counter
    psc_active: u32,
    arr_active: u32,
    ccr_active: [u32; 4],
    psc_cnt: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            cr1: 0,
            cr2: 0,
            smcr: 0,
            dier: 0,
            sr: 0,
            ccmr1: 0,
            ccmr2: 0,
            ccer: 0,
            cnt: 0,
            psc: 0,
            arr: 0xFFFF, // Default reset value
            ccr: [0; 4],
            psc_active: 0,
            arr_active: 0xFFFF,
            ccr_active: [0; 4],
            psc_cnt: 0,
        }
    }

    pub fn counter(&self) -> u32 {
        self.cnt
    }

    pub fn is_running(&self) -> bool {
        self.cr1 & CR1_CEN != 0
    }

    /// OCxM field of channel `index` (0-based).
    fn output_mode(&self, index: usize) -> u32 {
        let ccmr = if index < 2 { self.ccmr1 } else { self.ccmr2 };
        let shift = if index % 2 == 0 { 4 } else { 12 };
        (ccmr >> shift) & 0b111
    }

    fn preload_enabled(&self, index: usize) -> bool {
        let ccmr = if index < 2 { self.ccmr1 } else { self.ccmr2 };
        let bit = if index % 2 == 0 { 3 } else { 11 };
        ccmr & (1 << bit) != 0
    }

    fn channel_enabled(&self, index: usize) -> bool {
        self.ccer & (1 << (4 * index)) != 0
    }

    fn channel_inverted(&self, index: usize) -> bool {
        self.ccer & (1 << (4 * index + 1)) != 0
    }

    /// Output compare reference level of channel `index`, before polarity.
    fn oc_ref(&self, index: usize) -> bool {
        let below = self.cnt < self.ccr_active[index];
        match self.output_mode(index) {
            OCM_PWM1 => below,
            OCM_PWM2 => !below,
            0b101 => true,
            _ => false,
        }
    }

    /// Channel pin levels, `None` when no channel drives its output.
    pub fn outputs(&self) -> Option<[bool; 4]> {
        if !(0..4).any(|i| self.channel_enabled(i)) {
            return None;
        }
        let mut levels = [false; 4];
        for (i, level) in levels.iter_mut().enumerate() {
            *level = self.channel_enabled(i) && (self.oc_ref(i) ^ self.channel_inverted(i));
        }
        Some(levels)
    }

    fn irq_level(&self) -> bool {
        self.sr & self.dier & IRQ_FLAGS != 0
    }

    /// Update event: counter and prescaler counter to zero, shadow registers
    /// loaded.
    fn update(&mut self) {
        self.cnt = 0;
        self.psc_cnt = 0;
        self.psc_active = self.psc;
        self.arr_active = self.arr;
        self.ccr_active = self.ccr;
        self.sr |= SR_UIF;
    }

    fn compare(&mut self) {
        for i in 0..4 {
            if self.cnt == self.ccr_active[i] {
                self.sr |= 1 << (i + 1);
            }
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for Timer {
    fn read(&mut self, offset: u32) -> u32 {
        self.peek(offset)
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            CR1 => self.cr1,
            CR2 => self.cr2,
            SMCR => self.smcr,
            DIER => self.dier,
            SR => self.sr,
            // EGR is write-only
            EGR => 0,
            CCMR1 => self.ccmr1,
            CCMR2 => self.ccmr2,
            CCER => self.ccer,
            CNT => self.cnt,
            PSC => self.psc,
            ARR => self.arr,
            CCR1..=CCR4 if offset % 4 == 0 => self.ccr[((offset - CCR1) / 4) as usize],
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            CR1 => {
                if (value ^ self.cr1) & CR1_CEN != 0 {
                    tracing::debug!(
                        "TIM: counter {}",
                        if value & CR1_CEN != 0 { "enabled" } else { "disabled" }
                    );
                }
                self.cr1 = value & 0x3FF;
            }
            CR2 => self.cr2 = value & 0xF8,
            SMCR => self.smcr = value & 0xFFF7,
            DIER => self.dier = value & 0x5F5F,
            // TIMx_SR is rc_w0 for status flags: writing 0 clears, writing 1 keeps current.
            SR => self.sr &= value & 0x1E5F,
            EGR => {
                if value & EGR_UG != 0 {
                    self.update();
                }
                // CCxG bits force the matching capture/compare flag.
                self.sr |= value & 0x1E;
            }
            CCMR1 => self.ccmr1 = value & 0xFFFF,
            CCMR2 => self.ccmr2 = value & 0xFFFF,
            CCER => self.ccer = value & 0x3333,
            CNT => self.cnt = value & 0xFFFF,
            PSC => self.psc = value & 0xFFFF,
            ARR => {
                self.arr = value & 0xFFFF;
                if self.cr1 & CR1_ARPE == 0 {
                    self.arr_active = self.arr;
                }
            }
            CCR1..=CCR4 if offset % 4 == 0 => {
                let i = ((offset - CCR1) / 4) as usize;
                self.ccr[i] = value & 0xFFFF;
                if !self.preload_enabled(i) {
                    self.ccr_active[i] = self.ccr[i];
                }
            }
            _ => {}
        }
    }

    fn tick(&mut self) -> PeripheralTickResult {
        if self.cr1 & CR1_CEN != 0 && self.arr_active != 0 {
            self.psc_cnt += 1;
            if self.psc_cnt > self.psc_active {
                self.psc_cnt = 0;
                if self.cnt + 1 >= self.arr_active {
                    self.update();
                } else {
                    self.cnt += 1;
                }
                self.compare();
            }
        }

        PeripheralTickResult {
            irq: self.irq_level(),
            outputs: self.outputs(),
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
    use f1lab_hal::tim::DIER_UIE;

    fn running(psc: u32, arr: u32) -> Timer {
        let mut tim = Timer::new();
        tim.write(PSC, psc);
        tim.write(ARR, arr);
        tim.write(EGR, EGR_UG);
        tim.write(SR, !SR_UIF);
        tim.write(CR1, CR1_CEN);
        tim
    }

    #[test]
    fn test_egr_ug_sets_uif_and_cnt_reset() {
        let mut tim = Timer::new();
        tim.write(CNT, 0x1234);
        tim.write(EGR, EGR_UG);
        assert_eq!(tim.read(CNT), 0);
        assert_eq!(tim.read(SR) & SR_UIF, SR_UIF);
    }

    #[test]
    fn test_sr_write_zero_clears_uif_and_drops_irq() {
        let mut tim = Timer::new();

        // Enable UIE and set UIF via UG.
        tim.write(DIER, DIER_UIE);
        tim.write(EGR, EGR_UG);
        assert!(tim.tick().irq);

        tim.write(SR, !SR_UIF);
        assert_eq!(tim.read(SR) & SR_UIF, 0);
        assert!(!tim.tick().irq);
    }

    #[test]
    fn test_update_period_is_psc_plus_one_times_arr() {
        let mut tim = running(3, 10);
        let first = (1..=1000).find(|_| {
            tim.tick();
            tim.peek(SR) & SR_UIF != 0
        });
        assert_eq!(first, Some(40));
    }

    #[test]
    fn test_prescaler_is_buffered_until_update() {
        let mut tim = running(0, 5);
        tim.write(PSC, 9);
        // Old prescaler still active: update after 5 ticks.
        for _ in 0..5 {
            tim.tick();
        }
        assert_ne!(tim.peek(SR) & SR_UIF, 0);
        tim.write(SR, 0);
        for _ in 0..49 {
            tim.tick();
        }
        assert_eq!(tim.peek(SR) & SR_UIF, 0);
        tim.tick();
        assert_ne!(tim.peek(SR) & SR_UIF, 0);
    }

    #[test]
    fn test_pwm1_output_active_below_compare() {
        let mut tim = running(0, 10);
        tim.write(CCMR2, 0x6800);
        tim.write(CCER, 0x1000);
        tim.write(CCR4, 3);
        // CCR4 preloaded: takes effect at the next update.
        tim.write(EGR, EGR_UG);

        let mut active = 0;
        for _ in 0..10 {
            if tim.tick().outputs.unwrap()[3] {
                active += 1;
            }
        }
        assert_eq!(active, 3);
    }

    #[test]
    fn test_cc4_flag_once_per_period() {
        let mut tim = running(0, 10);
        tim.write(CCR4, 4);
        let mut matches = 0;
        for _ in 0..30 {
            tim.tick();
            if tim.peek(SR) & (1 << 4) != 0 {
                matches += 1;
                tim.write(SR, !(1 << 4));
            }
        }
        assert_eq!(matches, 3);
    }

    #[test]
    fn test_stopped_counter_holds() {
        let mut tim = Timer::new();
        tim.write(ARR, 10);
        for _ in 0..20 {
            tim.tick();
        }
        assert_eq!(tim.counter(), 0);
        assert_eq!(tim.peek(SR), 0);
    }
}
