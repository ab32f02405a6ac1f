// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{board, App};
use crate::bus::Bus;
use crate::gpio::{self, ActiveLowLed, Pin};
use crate::timing::{BusyWait, EventSource};

/// LED off through BSRR, long wait, LED on through BRR, short wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blink {
    pub led: ActiveLowLed,
    pub off: BusyWait,
    pub on: BusyWait,
}

impl Blink {
    pub const OFF_ITERATIONS: u32 = 800_000;
    pub const ON_ITERATIONS: u32 = 200_000;

    pub const fn new(pin: Pin) -> Self {
        Self {
            led: ActiveLowLed(pin),
            off: BusyWait::new(Self::OFF_ITERATIONS),
            on: BusyWait::new(Self::ON_ITERATIONS),
        }
    }
}

impl Default for Blink {
    fn default() -> Self {
        Self::new(board::LED.0)
    }
}

impl<B: Bus> App<B> for Blink {
    fn init(&mut self, bus: &mut B) {
        self.led.setup(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        self.led.off(bus);
        self.off.wait(bus);
        self.led.on(bus);
        self.on.wait(bus);
    }
}

/// `ODR ^= bit` then one fixed wait: a square wave at half the loop rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkXor {
    pub pin: Pin,
    pub delay: BusyWait,
}

impl BlinkXor {
    pub const ITERATIONS: u32 = 100_000;

    pub const fn new(pin: Pin) -> Self {
        Self {
            pin,
            delay: BusyWait::new(Self::ITERATIONS),
        }
    }
}

impl Default for BlinkXor {
    fn default() -> Self {
        Self::new(board::LED.0)
    }
}

impl<B: Bus> App<B> for BlinkXor {
    fn init(&mut self, bus: &mut B) {
        ActiveLowLed(self.pin).setup(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        gpio::toggle(bus, self.pin);
        self.delay.wait(bus);
    }
}

/// LED off with `ODR |= bit`, short wait, LED on with `ODR &= !bit`, long
/// wait. Both writes read-modify-write the whole port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkOdr {
    pub pin: Pin,
    pub off: BusyWait,
    pub on: BusyWait,
}

impl BlinkOdr {
    pub const OFF_ITERATIONS: u32 = 100_000;
    pub const ON_ITERATIONS: u32 = 500_000;

    pub const fn new(pin: Pin) -> Self {
        Self {
            pin,
            off: BusyWait::new(Self::OFF_ITERATIONS),
            on: BusyWait::new(Self::ON_ITERATIONS),
        }
    }
}

impl Default for BlinkOdr {
    fn default() -> Self {
        Self::new(board::LED.0)
    }
}

impl<B: Bus> App<B> for BlinkOdr {
    fn init(&mut self, bus: &mut B) {
        ActiveLowLed(self.pin).setup(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        gpio::set_odr_bit(bus, self.pin, true);
        self.off.wait(bus);
        gpio::set_odr_bit(bus, self.pin, false);
        self.on.wait(bus);
    }
}
