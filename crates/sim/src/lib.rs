// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host-side stand-in for the STM32F103 peripheral space.
//!
//! [`bus::SystemBus`] implements [`f1lab_hal::Bus`], so the programs in
//! `f1lab-hal` run unchanged against in-memory register models. One
//! [`f1lab_hal::Bus::idle`] call advances simulated time by one core cycle;
//! register accesses themselves take no time.

pub mod bus;
pub mod peripherals;
pub mod snapshot;
pub mod trace;

use std::any::Any;

use f1lab_hal::gpio::Pin;
use f1lab_hal::vector::Exception;
use f1lab_hal::App;

pub use bus::SystemBus;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("peripheral '{name}' at {base:#010x} overlaps '{other}'")]
    Overlap {
        name: String,
        base: u32,
        other: String,
    },
    #[error("unknown peripheral '{0}'")]
    UnknownPeripheral(String),
    #[error("core clock must be non-zero")]
    ZeroClock,
    #[error("ADC channel {0} does not exist (0..=17)")]
    InvalidChannel(u8),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Output of one peripheral clock cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    /// Interrupt request. Level-sensitive for device lines, a one-cycle
    /// pulse for the SysTick exception.
    pub irq: bool,
    /// Compare output levels of CH1..CH4, for timers with enabled channels.
    pub outputs: Option<[bool; 4]>,
}

/// A memory-mapped register block, addressed by word offset from its base.
pub trait Peripheral: std::fmt::Debug + Send {
    /// Bus read. May have side effects (clear-on-read flags).
    fn read(&mut self, offset: u32) -> u32;

    /// Register value without read side effects.
    fn peek(&self, offset: u32) -> u32;

    fn write(&mut self, offset: u32, value: u32);

    /// Advance one cycle of the peripheral's clock.
    fn tick(&mut self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Hooks for watching a run without touching the bus.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_pin_change(&self, _cycle: u64, _pin: Pin, _high: bool) {}
    fn on_interrupt(&self, _cycle: u64, _exception: Exception) {}
    fn on_gated_write(&self, _cycle: u64, _peripheral: &str, _addr: u32) {}
}

/// A program bound to a bus: handlers installed, `init` done.
pub struct Machine {
    pub bus: SystemBus,
    app: Box<dyn App<SystemBus>>,
    polls: u64,
}

impl Machine {
    pub fn new(mut bus: SystemBus, mut app: Box<dyn App<SystemBus>>) -> Self {
        app.install(bus.vectors_mut());
        tracing::info!(
            "Machine: vectors installed: {:?}",
            bus.vectors().registered().collect::<Vec<_>>()
        );
        app.init(&mut bus);
        tracing::info!("Machine: init done at cycle {}", bus.cycles());
        Self {
            bus,
            app,
            polls: 0,
        }
    }

    /// Loop passes until at least `cycles` cycles have elapsed since the
    /// call. The last pass may overshoot; it is never cut short.
    pub fn run_for(&mut self, cycles: u64) -> u64 {
        let deadline = self.bus.cycles().saturating_add(cycles);
        while self.bus.cycles() < deadline {
            let before = self.bus.cycles();
            self.app.poll(&mut self.bus);
            self.polls += 1;
            if self.bus.cycles() == before {
                // A pass that never idles would spin forever on the host.
                self.bus.idle_for(1);
            }
        }
        self.bus.cycles()
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn into_bus(self) -> SystemBus {
        self.bus
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cycles", &self.bus.cycles())
            .field("polls", &self.polls)
            .finish()
    }
}
