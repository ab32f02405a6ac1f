// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{board, App};
use crate::afio::{self, Tim3Remap};
use crate::bus::Bus;
use crate::gpio::{self, ActiveLowLed, PinMode, Speed};
use crate::nvic;
use crate::rcc::{self, Apb2};
use crate::tim::{Channel, PwmConfig, TIM3};
use crate::timing::TimerConfig;
use crate::vector::{Exception, VectorTable};

/// TIM3 channel 4 in PWM mode 1 on PB1, active low. The CC4 match
/// interrupt toggles the on-board LED once per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pwm {
    pub led: ActiveLowLed,
    pub timer: TimerConfig,
    pub output: PwmConfig,
}

impl Pwm {
    pub const PRESCALER: u16 = 7999;
    pub const RELOAD: u16 = 1000;
    pub const COMPARE: u16 = 100;

    pub const fn new(timer: TimerConfig, compare: u16) -> Self {
        Self {
            led: board::LED,
            timer: TimerConfig {
                interrupt: false,
                ..timer
            },
            output: PwmConfig {
                channel: Channel::C4,
                compare,
                inverted: true,
                interrupt: true,
            },
        }
    }

    /// Fraction of the period the channel is in its active state.
    pub fn duty(&self) -> f32 {
        if self.timer.reload == 0 {
            return 0.0;
        }
        self.output.compare.min(self.timer.reload) as f32 / self.timer.reload as f32
    }
}

impl Default for Pwm {
    /// 1 s period, 100 ms active.
    fn default() -> Self {
        Self::new(
            TimerConfig::new(board::CORE_HZ, Self::PRESCALER, Self::RELOAD, false),
            Self::COMPARE,
        )
    }
}

pub fn on_tim3_compare4<B: Bus>(bus: &mut B) {
    board::LED.toggle(bus);
    TIM3.clear_compare(bus, Channel::C4);
}

impl<B: Bus> App<B> for Pwm {
    fn init(&mut self, bus: &mut B) {
        rcc::enable(bus, Apb2::AFIO | Apb2::IOPC | Apb2::IOPB);
        rcc::enable(bus, TIM3.gate());

        self.led.setup(bus);
        gpio::configure(bus, board::PWM_PIN, PinMode::AltPushPull(Speed::Mhz2));
        afio::remap_tim3(bus, Tim3Remap::None);

        TIM3.stop(bus);
        TIM3.configure_pwm(bus, &self.output);
        nvic::set_priority(bus, TIM3.irq(), board::TIM3_PRIORITY);
        nvic::enable(bus, TIM3.irq());
        TIM3.configure(bus, &self.timer);
    }

    /// Everything happens in hardware and in the handler.
    fn poll(&mut self, bus: &mut B) {
        bus.wait_for_interrupt();
    }

    fn install(&self, table: &mut VectorTable<B>) {
        table.register(Exception::Irq(TIM3.irq()), on_tim3_compare4::<B>);
    }
}
