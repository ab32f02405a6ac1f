// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The application loop and the programs built on it.
//!
//! Each program is split into a one-time [`App::init`], one pass of its
//! endless loop in [`App::poll`], and its interrupt handlers, registered by
//! [`App::install`]. Handlers are plain functions over the bus; whatever they
//! share with the main loop lives in peripheral registers.

mod adc;
mod blink;
mod pwm;
mod systick;
mod timer;

pub use adc::AdcThreshold;
pub use blink::{Blink, BlinkOdr, BlinkXor};
pub use pwm::{on_tim3_compare4, Pwm};
pub use systick::{on_systick, SysTickIrq, SysTickPoll};
pub use timer::{on_tim3_update, Timer3Irq, Timer3Poll};

use core::fmt;
use core::str::FromStr;

use crate::bus::Bus;
use crate::vector::VectorTable;

pub trait App<B: Bus> {
    fn init(&mut self, bus: &mut B);

    /// One pass of the main loop body.
    fn poll(&mut self, bus: &mut B);

    /// Fill this program's vector table slots. Programs without interrupts
    /// leave the table untouched.
    fn install(&self, _table: &mut VectorTable<B>) {}

    fn run(&mut self, bus: &mut B) -> ! {
        self.init(bus);
        loop {
            self.poll(bus);
        }
    }
}

/// Blue Pill wiring shared by the programs.
pub mod board {
    use crate::gpio::{ActiveLowLed, Pin, Port};

    pub const CORE_HZ: u32 = crate::rcc::HSI_HZ;

    /// On-board LED, cathode on PC13.
    pub const LED: ActiveLowLed = ActiveLowLed(Pin::new(Port::C, 13));

    /// TIM3_CH4 without remap.
    pub const PWM_PIN: Pin = Pin::new(Port::B, 1);

    pub const ANALOG_PIN: Pin = Pin::new(Port::A, 7);
    pub const ANALOG_CHANNEL: u8 = 7;

    /// Half of the 12-bit range: below it the LED is on.
    pub const ADC_THRESHOLD: u16 = 0x800;

    pub const TIM3_PRIORITY: u8 = 0x10;
}

/// The programs by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Blink,
    BlinkXor,
    BlinkOdr,
    SysTickPoll,
    SysTickIrq,
    Timer3Poll,
    Timer3Irq,
    Pwm,
    Adc,
}

impl Program {
    pub const ALL: [Program; 9] = [
        Program::Blink,
        Program::BlinkXor,
        Program::BlinkOdr,
        Program::SysTickPoll,
        Program::SysTickIrq,
        Program::Timer3Poll,
        Program::Timer3Irq,
        Program::Pwm,
        Program::Adc,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Program::Blink => "blink",
            Program::BlinkXor => "blink-xor",
            Program::BlinkOdr => "blink-odr",
            Program::SysTickPoll => "systick-poll",
            Program::SysTickIrq => "systick-irq",
            Program::Timer3Poll => "timer3-poll",
            Program::Timer3Irq => "timer3-irq",
            Program::Pwm => "pwm",
            Program::Adc => "adc",
        }
    }

    pub const fn summary(self) -> &'static str {
        match self {
            Program::Blink => "GPIO set/reset through BSRR/BRR, busy-wait delays",
            Program::BlinkXor => "GPIO toggle through ODR ^=, busy-wait delay",
            Program::BlinkOdr => "GPIO set/clear through ODR |= and &=, busy-wait delays",
            Program::SysTickPoll => "SysTick COUNTFLAG polled millisecond delay",
            Program::SysTickIrq => "SysTick exception toggles PC13",
            Program::Timer3Poll => "TIM3 free-running counter, UG reset and CNT polling",
            Program::Timer3Irq => "TIM3 update interrupt toggles PC13",
            Program::Pwm => "TIM3 CH4 PWM on PB1, CC4 interrupt toggles PC13",
            Program::Adc => "ADC1 channel 7 polled, LED on below 0x800",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dash and underscore spellings are the same name.
impl FromStr for Program {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Program::ALL
            .into_iter()
            .find(|p| same_name(p.name(), s))
            .ok_or(())
    }
}

fn same_name(name: &str, other: &str) -> bool {
    name.len() == other.len()
        && name.bytes().zip(other.bytes()).all(|(a, b)| {
            let b = if b == b'_' { b'-' } else { b };
            a.eq_ignore_ascii_case(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_names_parse() {
        for program in Program::ALL {
            assert_eq!(program.name().parse::<Program>(), Ok(program));
        }
        assert_eq!("Timer3_IRQ".parse::<Program>(), Ok(Program::Timer3Irq));
        assert!("uart".parse::<Program>().is_err());
    }
}
