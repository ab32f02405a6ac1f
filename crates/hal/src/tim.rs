// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! General-purpose timers TIM2..TIM4.
//!
//! All three share one register layout; a [`GeneralTimer`] value only carries
//! the base address, the NVIC line and the APB1 gate. The timer must be
//! clocked (`rcc::enable(bus, timer.gate())`) before any call below.

use crate::bus::{Bus, Reg};
use crate::nvic::irq;
use crate::rcc::Apb1;
use crate::timing::TimerConfig;

pub const CR1_CEN: u32 = 1 << 0;
pub const CR1_ARPE: u32 = 1 << 7;
pub const EGR_UG: u32 = 1 << 0;
pub const DIER_UIE: u32 = 1 << 0;
pub const SR_UIF: u32 = 1 << 0;

/// Output compare mode 1: active while CNT < CCRx.
pub const OCM_PWM1: u32 = 0b110;
/// Output compare mode 2: inactive while CNT < CCRx.
pub const OCM_PWM2: u32 = 0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneralTimer {
    base: u32,
    irq: u8,
    gate: Apb1,
}

pub const TIM2: GeneralTimer = GeneralTimer::new(0x4000_0000, irq::TIM2, Apb1::TIM2);
pub const TIM3: GeneralTimer = GeneralTimer::new(0x4000_0400, irq::TIM3, Apb1::TIM3);
pub const TIM4: GeneralTimer = GeneralTimer::new(0x4000_0800, irq::TIM4, Apb1::TIM4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    C1 = 1,
    C2 = 2,
    C3 = 3,
    C4 = 4,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::C1, Channel::C2, Channel::C3, Channel::C4];

    /// CCxIF in SR and CCxIE in DIER share this bit.
    pub const fn flag(self) -> u32 {
        1 << self as u32
    }

    const fn index(self) -> u32 {
        self as u32 - 1
    }
}

/// Compare channel settings for PWM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmConfig {
    pub channel: Channel,
    pub compare: u16,
    /// CCxP: output active low.
    pub inverted: bool,
    /// CCxIE: raise the timer interrupt on compare match.
    pub interrupt: bool,
}

impl GeneralTimer {
    pub const fn new(base: u32, irq: u8, gate: Apb1) -> Self {
        Self { base, irq, gate }
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    pub const fn irq(&self) -> u8 {
        self.irq
    }

    pub const fn gate(&self) -> Apb1 {
        self.gate
    }

    pub const fn cr1(&self) -> Reg {
        Reg::at(self.base + 0x00)
    }

    pub const fn dier(&self) -> Reg {
        Reg::at(self.base + 0x0C)
    }

    pub const fn sr(&self) -> Reg {
        Reg::at(self.base + 0x10)
    }

    pub const fn egr(&self) -> Reg {
        Reg::at(self.base + 0x14)
    }

    pub const fn ccmr1(&self) -> Reg {
        Reg::at(self.base + 0x18)
    }

    pub const fn ccmr2(&self) -> Reg {
        Reg::at(self.base + 0x1C)
    }

    pub const fn ccer(&self) -> Reg {
        Reg::at(self.base + 0x20)
    }

    pub const fn cnt(&self) -> Reg {
        Reg::at(self.base + 0x24)
    }

    pub const fn psc(&self) -> Reg {
        Reg::at(self.base + 0x28)
    }

    pub const fn arr(&self) -> Reg {
        Reg::at(self.base + 0x2C)
    }

    pub const fn ccr(&self, channel: Channel) -> Reg {
        Reg::at(self.base + 0x34 + 4 * channel.index())
    }

    /// Counter off, PSC and ARR, UG, UIF cleared, UIE as requested, counter on.
    ///
    /// Running it twice with the same config leaves the timer in the same
    /// state as running it once.
    pub fn configure<B: Bus>(&self, bus: &mut B, config: &TimerConfig) {
        self.stop(bus);
        self.psc().write(bus, config.prescaler as u32);
        self.arr().write(bus, config.reload as u32);
        self.generate_update(bus);
        self.clear_update(bus);
        if config.interrupt {
            self.listen_update(bus);
        } else {
            self.unlisten_update(bus);
        }
        self.start(bus);
    }

    pub fn start<B: Bus>(&self, bus: &mut B) {
        self.cr1().set_bits(bus, CR1_CEN);
    }

    pub fn stop<B: Bus>(&self, bus: &mut B) {
        self.cr1().clear_bits(bus, CR1_CEN);
    }

    /// Zeroes the counter and loads the buffered prescaler. Sets UIF.
    pub fn generate_update<B: Bus>(&self, bus: &mut B) {
        self.egr().write(bus, EGR_UG);
    }

    pub fn counter<B: Bus>(&self, bus: &mut B) -> u16 {
        self.cnt().read(bus) as u16
    }

    pub fn is_update_pending<B: Bus>(&self, bus: &mut B) -> bool {
        self.sr().is_set(bus, SR_UIF)
    }

    /// SR is rc_w0: the zero bit clears, the ones leave other flags alone.
    pub fn clear_update<B: Bus>(&self, bus: &mut B) {
        self.sr().write(bus, !SR_UIF);
    }

    pub fn listen_update<B: Bus>(&self, bus: &mut B) {
        self.dier().set_bits(bus, DIER_UIE);
    }

    pub fn unlisten_update<B: Bus>(&self, bus: &mut B) {
        self.dier().clear_bits(bus, DIER_UIE);
    }

    pub fn set_compare<B: Bus>(&self, bus: &mut B, channel: Channel, value: u16) {
        self.ccr(channel).write(bus, value as u32);
    }

    pub fn compare<B: Bus>(&self, bus: &mut B, channel: Channel) -> u16 {
        self.ccr(channel).read(bus) as u16
    }

    pub fn is_compare_pending<B: Bus>(&self, bus: &mut B, channel: Channel) -> bool {
        self.sr().is_set(bus, channel.flag())
    }

    pub fn clear_compare<B: Bus>(&self, bus: &mut B, channel: Channel) {
        self.sr().write(bus, !channel.flag());
    }

    /// PWM mode 1 with CCRx preload, output enabled. Does not touch PSC, ARR
    /// or CEN; pair with [`GeneralTimer::configure`].
    pub fn configure_pwm<B: Bus>(&self, bus: &mut B, pwm: &PwmConfig) {
        let (ccmr, shift) = match pwm.channel {
            Channel::C1 => (self.ccmr1(), 0),
            Channel::C2 => (self.ccmr1(), 8),
            Channel::C3 => (self.ccmr2(), 0),
            Channel::C4 => (self.ccmr2(), 8),
        };
        // OCxM at 6:4, OCxPE at 3, relative to the channel byte.
        ccmr.write_field(bus, shift + 4, 3, OCM_PWM1);
        ccmr.set_bits(bus, 1 << (shift + 3));
        self.set_compare(bus, pwm.channel, pwm.compare);

        let ccer_shift = 4 * pwm.channel.index();
        let mut ccer = 1 << ccer_shift;
        if pwm.inverted {
            ccer |= 1 << (ccer_shift + 1);
        }
        self.ccer().set_bits(bus, ccer);

        if pwm.interrupt {
            self.dier().set_bits(bus, pwm.channel.flag());
        }
    }
}
