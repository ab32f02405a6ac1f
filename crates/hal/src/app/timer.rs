// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{board, App};
use crate::bus::Bus;
use crate::gpio::ActiveLowLed;
use crate::rcc;
use crate::tim::TIM3;
use crate::timing::{EventSource, IrqEvent, TimerConfig, TimerDelay};
use crate::vector::{Exception, VectorTable};

/// TIM3 at 1 MHz, restarted with UG and polled until CNT reaches 1000 once
/// per millisecond. Toggles every `delay.millis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer3Poll {
    pub led: ActiveLowLed,
    pub delay: TimerDelay,
}

impl Timer3Poll {
    pub const MILLIS: u32 = 100;

    pub const fn new(source_hz: u32, millis: u32) -> Self {
        Self {
            led: board::LED,
            delay: TimerDelay::new(TIM3, source_hz, millis),
        }
    }
}

impl Default for Timer3Poll {
    fn default() -> Self {
        Self::new(board::CORE_HZ, Self::MILLIS)
    }
}

impl<B: Bus> App<B> for Timer3Poll {
    fn init(&mut self, bus: &mut B) {
        self.led.setup(bus);
        rcc::enable(bus, TIM3.gate());
        self.delay.start(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        self.led.toggle(bus);
        self.delay.wait(bus);
    }
}

/// TIM3 update interrupt; the handler toggles the LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer3Irq {
    pub led: ActiveLowLed,
    pub event: IrqEvent,
}

impl Timer3Irq {
    pub const PRESCALER: u16 = 7999;
    pub const RELOAD: u16 = 1000;

    pub const fn new(config: TimerConfig) -> Self {
        Self {
            led: board::LED,
            event: IrqEvent::timer(TIM3, config, board::TIM3_PRIORITY),
        }
    }
}

impl Default for Timer3Irq {
    /// One update per second from the 8 MHz clock.
    fn default() -> Self {
        Self::new(TimerConfig::new(
            board::CORE_HZ,
            Self::PRESCALER,
            Self::RELOAD,
            true,
        ))
    }
}

pub fn on_tim3_update<B: Bus>(bus: &mut B) {
    board::LED.toggle(bus);
    TIM3.clear_update(bus);
}

impl<B: Bus> App<B> for Timer3Irq {
    fn init(&mut self, bus: &mut B) {
        self.led.setup(bus);
        rcc::enable(bus, TIM3.gate());
        self.event.start(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        self.event.wait(bus);
    }

    fn install(&self, table: &mut VectorTable<B>) {
        table.register(Exception::Irq(TIM3.irq()), on_tim3_update::<B>);
    }
}
