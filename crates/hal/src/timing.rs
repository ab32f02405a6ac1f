// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Timing and event sources.
//!
//! Three strategies produce the periodic event every program runs on:
//!
//! * [`BusyWait`]: a counted loop of [`Bus::idle`] calls.
//! * [`SysTickDelay`] and [`TimerDelay`]: a hardware counter polled from the
//!   main loop.
//! * [`IrqEvent`]: a counter raising an interrupt; the handler in the vector
//!   table does the work and the main loop only halts.
//!
//! None of them can fail. A wrong configuration shows up as wrong timing or
//! as a loop that never ends.

use crate::bus::Bus;
use crate::nvic;
use crate::systick::{self, ClockSource};
use crate::tim::GeneralTimer;

/// Prescaler/reload pair for a 16-bit timer fed by `source_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub source_hz: u32,
    pub prescaler: u16,
    pub reload: u16,
    pub interrupt: bool,
}

impl TimerConfig {
    pub const fn new(source_hz: u32, prescaler: u16, reload: u16, interrupt: bool) -> Self {
        Self {
            source_hz,
            prescaler,
            reload,
            interrupt,
        }
    }

    /// Counter frequency after the prescaler.
    pub const fn tick_hz(&self) -> u32 {
        self.source_hz / (self.prescaler as u32 + 1)
    }

    /// Source cycles between two update events: `(PSC + 1) * ARR`.
    pub const fn period_cycles(&self) -> u64 {
        (self.prescaler as u64 + 1) * self.reload as u64
    }

    pub const fn period_micros(&self) -> u64 {
        if self.source_hz == 0 {
            return 0;
        }
        self.period_cycles() * 1_000_000 / self.source_hz as u64
    }

    /// Smallest prescaler whose reload fits 16 bits for a `micros` period.
    /// `None` when the period is shorter than one source cycle or longer than
    /// the timer can count.
    pub fn for_period(source_hz: u32, micros: u64) -> Option<Self> {
        let cycles = (source_hz as u64).checked_mul(micros)? / 1_000_000;
        if cycles == 0 {
            return None;
        }
        let divider = cycles.div_ceil(u16::MAX as u64);
        if divider > u16::MAX as u64 + 1 {
            return None;
        }
        let reload = cycles / divider;
        Some(Self::new(
            source_hz,
            (divider - 1) as u16,
            reload as u16,
            false,
        ))
    }

    pub const fn with_interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// A source of periodic events the main loop can wait on.
pub trait EventSource<B: Bus> {
    /// Program the underlying counter. Peripheral clocks must already be on.
    fn start(&mut self, bus: &mut B);

    /// Block until the next event.
    fn wait(&mut self, bus: &mut B);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyWait {
    pub iterations: u32,
}

impl BusyWait {
    pub const fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Iterations for `millis` at `core_hz`, given the cycles one loop pass
    /// costs on the target.
    pub const fn calibrated(millis: u32, core_hz: u32, cycles_per_iteration: u32) -> Self {
        let cycles = millis as u64 * core_hz as u64 / 1000;
        let per = if cycles_per_iteration == 0 {
            1
        } else {
            cycles_per_iteration as u64
        };
        let iterations = cycles / per;
        Self {
            iterations: if iterations > u32::MAX as u64 {
                u32::MAX
            } else {
                iterations as u32
            },
        }
    }
}

impl<B: Bus> EventSource<B> for BusyWait {
    fn start(&mut self, _bus: &mut B) {}

    fn wait(&mut self, bus: &mut B) {
        for _ in 0..self.iterations {
            bus.idle();
        }
    }
}

/// SysTick reloaded every millisecond, interrupt off, COUNTFLAG polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysTickDelay {
    pub source: ClockSource,
    pub core_hz: u32,
    pub millis: u32,
}

impl SysTickDelay {
    pub const fn new(source: ClockSource, core_hz: u32, millis: u32) -> Self {
        Self {
            source,
            core_hz,
            millis,
        }
    }

    /// Whether one millisecond is at least one tick of the selected clock.
    pub const fn supports_clock(source: ClockSource, core_hz: u32) -> bool {
        source.hz(core_hz) >= 1000
    }

    /// The counter wraps every `reload + 1` ticks.
    pub const fn reload(&self) -> u32 {
        let ticks = self.source.hz(self.core_hz) / 1000;
        if ticks == 0 {
            0
        } else {
            ticks - 1
        }
    }

    pub fn delay_millis<B: Bus>(bus: &mut B, millis: u32) {
        for _ in 0..millis {
            while !systick::has_wrapped(bus) {
                bus.idle();
            }
        }
    }
}

impl<B: Bus> EventSource<B> for SysTickDelay {
    fn start(&mut self, bus: &mut B) {
        systick::configure(bus, self.source, self.reload(), false);
    }

    fn wait(&mut self, bus: &mut B) {
        Self::delay_millis(bus, self.millis);
    }
}

/// Counter ticks per millisecond for [`TimerDelay`].
pub const TIMER_DELAY_TICKS_PER_MS: u16 = 1000;

/// A timer free-running at 1 MHz; each millisecond restarts it with UG and
/// spins until CNT reaches 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDelay {
    pub timer: GeneralTimer,
    pub source_hz: u32,
    pub millis: u32,
}

impl TimerDelay {
    pub const fn new(timer: GeneralTimer, source_hz: u32, millis: u32) -> Self {
        Self {
            timer,
            source_hz,
            millis,
        }
    }

    /// Whether a prescaler divides `source_hz` down to exactly 1 MHz.
    pub const fn supports_clock(source_hz: u32) -> bool {
        source_hz >= 1_000_000 && source_hz % 1_000_000 == 0
    }

    pub const fn config(&self) -> TimerConfig {
        let per_us = self.source_hz / 1_000_000;
        let prescaler = if per_us == 0 { 0 } else { per_us - 1 };
        TimerConfig::new(self.source_hz, prescaler as u16, 0xFFFF, false)
    }

    pub fn delay_millis<B: Bus>(&self, bus: &mut B, millis: u32) {
        for _ in 0..millis {
            self.timer.generate_update(bus);
            while self.timer.counter(bus) < TIMER_DELAY_TICKS_PER_MS {
                bus.idle();
            }
        }
    }
}

impl<B: Bus> EventSource<B> for TimerDelay {
    fn start(&mut self, bus: &mut B) {
        self.timer.configure(bus, &self.config());
    }

    fn wait(&mut self, bus: &mut B) {
        self.delay_millis(bus, self.millis);
    }
}

/// The counter behind an [`IrqEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSource {
    SysTick { source: ClockSource, reload: u32 },
    Timer { timer: GeneralTimer, config: TimerConfig, priority: u8 },
}

/// Interrupt-driven events: `wait` halts until a handler has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqEvent {
    pub source: IrqSource,
}

impl IrqEvent {
    pub const fn systick(source: ClockSource, reload: u32) -> Self {
        Self {
            source: IrqSource::SysTick { source, reload },
        }
    }

    pub const fn timer(timer: GeneralTimer, config: TimerConfig, priority: u8) -> Self {
        Self {
            source: IrqSource::Timer {
                timer,
                config: config.with_interrupt(true),
                priority,
            },
        }
    }
}

impl<B: Bus> EventSource<B> for IrqEvent {
    fn start(&mut self, bus: &mut B) {
        match self.source {
            IrqSource::SysTick { source, reload } => {
                systick::configure(bus, source, reload, true);
            }
            IrqSource::Timer {
                timer,
                config,
                priority,
            } => {
                timer.configure(bus, &config);
                nvic::set_priority(bus, timer.irq(), priority);
                nvic::enable(bus, timer.irq());
            }
        }
    }

    fn wait(&mut self, bus: &mut B) {
        bus.wait_for_interrupt();
    }
}
