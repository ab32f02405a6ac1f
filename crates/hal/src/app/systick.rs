// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{board, App};
use crate::bus::Bus;
use crate::gpio::ActiveLowLed;
use crate::systick::ClockSource;
use crate::timing::{EventSource, IrqEvent, SysTickDelay};
use crate::vector::{Exception, VectorTable};

/// Toggle, then a COUNTFLAG-polled delay of `delay.millis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysTickPoll {
    pub led: ActiveLowLed,
    pub delay: SysTickDelay,
}

impl SysTickPoll {
    pub const MILLIS: u32 = 500;

    pub const fn new(source: ClockSource, core_hz: u32, millis: u32) -> Self {
        Self {
            led: board::LED,
            delay: SysTickDelay::new(source, core_hz, millis),
        }
    }
}

impl Default for SysTickPoll {
    fn default() -> Self {
        Self::new(ClockSource::Processor, board::CORE_HZ, Self::MILLIS)
    }
}

impl<B: Bus> App<B> for SysTickPoll {
    fn init(&mut self, bus: &mut B) {
        self.led.setup(bus);
        self.delay.start(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        self.led.toggle(bus);
        self.delay.wait(bus);
    }
}

/// SysTick exception every `reload + 1` ticks; the handler toggles the LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysTickIrq {
    pub led: ActiveLowLed,
    pub event: IrqEvent,
}

impl SysTickIrq {
    /// 200 ms on the AHB/8 reference clock.
    pub const RELOAD: u32 = 200_000;

    pub const fn new(source: ClockSource, reload: u32) -> Self {
        Self {
            led: board::LED,
            event: IrqEvent::systick(source, reload),
        }
    }
}

impl Default for SysTickIrq {
    fn default() -> Self {
        Self::new(ClockSource::External, Self::RELOAD)
    }
}

/// SysTick pending is cleared on exception entry; nothing to acknowledge.
pub fn on_systick<B: Bus>(bus: &mut B) {
    board::LED.toggle(bus);
}

impl<B: Bus> App<B> for SysTickIrq {
    fn init(&mut self, bus: &mut B) {
        self.led.setup(bus);
        self.event.start(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        self.event.wait(bus);
    }

    fn install(&self, table: &mut VectorTable<B>) {
        table.register(Exception::SysTick, on_systick::<B>);
    }
}
