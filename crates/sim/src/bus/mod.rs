// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::adc::{self, Adc};
use crate::peripherals::afio::Afio;
use crate::peripherals::gpio::GpioPort;
use crate::peripherals::nvic::{Nvic, NvicState};
use crate::peripherals::rcc::Rcc;
use crate::peripherals::systick::Systick;
use crate::peripherals::timer::Timer;
use crate::snapshot::{BusSnapshot, BusStats, PeripheralSnapshot};
use crate::trace::{InterruptEvent, PinEvent, Trace};
use crate::{Peripheral, SimResult, SimulationError, SimulationObserver};
use f1lab_hal::afio::Tim3Remap;
use f1lab_hal::gpio::{Pin, Port};
use f1lab_hal::nvic::irq;
use f1lab_hal::rcc::{Apb1, Apb2, ClockGate};
use f1lab_hal::vector::{Exception, VectorTable, VECTOR_COUNT};
use f1lab_hal::Bus;
use std::sync::Arc;

pub struct PeripheralEntry {
    pub name: String,
    pub base: u32,
    pub size: u32,
    pub irq: Option<Exception>,
    /// Enable bit the peripheral's clock hangs off. `None` for blocks that
    /// are always clocked.
    pub gate: Option<ClockGate>,
    pub dev: Box<dyn Peripheral>,
    last_outputs: Option<[bool; 4]>,
}

impl PeripheralEntry {
    pub fn new(name: &str, base: u32, size: u32, dev: Box<dyn Peripheral>) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            irq: None,
            gate: None,
            dev,
            last_outputs: None,
        }
    }

    pub fn with_irq(mut self, exception: Exception) -> Self {
        self.irq = Some(exception);
        self
    }

    pub fn with_gate(mut self, gate: impl Into<ClockGate>) -> Self {
        self.gate = Some(gate.into());
        self
    }

    fn contains(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.base) < self.size
    }

    fn overlaps(&self, other: &PeripheralEntry) -> bool {
        self.base < other.base.saturating_add(other.size)
            && other.base < self.base.saturating_add(self.size)
    }

    /// Whether this block's outputs or registers decide pad levels.
    fn drives_pins(&self) -> bool {
        self.name.starts_with("gpio") || self.name == "afio"
    }
}

struct Watchdog {
    limit: u64,
    action: Box<dyn FnMut(u64) + Send>,
}

/// The STM32F103 peripheral space, clocked one core cycle per
/// [`Bus::idle`].
///
/// Each cycle ticks every clocked peripheral, latches their interrupt
/// requests into the NVIC (or the SysTick pending bit), routes timer compare
/// outputs to their pins, then runs the handlers of pending exceptions
/// unless delivery is masked or a handler is already running.
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    pub nvic: Arc<NvicState>,
    vectors: VectorTable<SystemBus>,
    core_hz: u32,
    cycles: u64,
    rcc: Option<usize>,
    masked: u32,
    in_handler: bool,
    systick_pending: bool,
    reroute: bool,
    pins: [u16; 5],
    counts: [u64; VECTOR_COUNT],
    warned: u128,
    stats: BusStats,
    trace: Trace,
    observers: Vec<Arc<dyn SimulationObserver>>,
    watchdog: Option<Watchdog>,
}

fn gate_open(gate: Option<ClockGate>, apb1: u32, apb2: u32) -> bool {
    match gate {
        None => true,
        Some(ClockGate::Apb1(bits)) => apb1 & bits.bits() == bits.bits(),
        Some(ClockGate::Apb2(bits)) => apb2 & bits.bits() == bits.bits(),
    }
}

impl SystemBus {
    /// A bus with no peripherals attached.
    pub fn empty(core_hz: u32) -> SimResult<Self> {
        if core_hz == 0 {
            return Err(SimulationError::ZeroClock);
        }
        Ok(Self {
            peripherals: Vec::new(),
            nvic: Arc::new(NvicState::default()),
            vectors: VectorTable::new(),
            core_hz,
            cycles: 0,
            rcc: None,
            masked: 0,
            in_handler: false,
            systick_pending: false,
            reroute: false,
            pins: [0; 5],
            counts: [0; VECTOR_COUNT],
            warned: 0,
            stats: BusStats::default(),
            trace: Trace::default(),
            observers: Vec::new(),
            watchdog: None,
        })
    }

    /// Medium-density F103 peripheral map.
    pub fn new(core_hz: u32) -> SimResult<Self> {
        let mut bus = Self::empty(core_hz)?;
        let nvic = Nvic::new(bus.nvic.clone());

        bus.add_peripheral(
            PeripheralEntry::new("tim2", 0x4000_0000, 0x400, Box::new(Timer::new()))
                .with_irq(Exception::Irq(irq::TIM2))
                .with_gate(Apb1::TIM2),
        )?;
        bus.add_peripheral(
            PeripheralEntry::new("tim3", 0x4000_0400, 0x400, Box::new(Timer::new()))
                .with_irq(Exception::Irq(irq::TIM3))
                .with_gate(Apb1::TIM3),
        )?;
        bus.add_peripheral(
            PeripheralEntry::new("tim4", 0x4000_0800, 0x400, Box::new(Timer::new()))
                .with_irq(Exception::Irq(irq::TIM4))
                .with_gate(Apb1::TIM4),
        )?;
        bus.add_peripheral(
            PeripheralEntry::new("afio", 0x4001_0000, 0x400, Box::new(Afio::new()))
                .with_gate(Apb2::AFIO),
        )?;
        for port in Port::ALL {
            let name = format!("gpio{}", port.letter().to_ascii_lowercase());
            bus.add_peripheral(
                PeripheralEntry::new(&name, port.base(), 0x400, Box::new(GpioPort::new()))
                    .with_gate(port.clock()),
            )?;
        }
        bus.add_peripheral(
            PeripheralEntry::new("adc1", 0x4001_2400, 0x400, Box::new(Adc::new()))
                .with_irq(Exception::Irq(irq::ADC1_2))
                .with_gate(Apb2::ADC1),
        )?;
        bus.add_peripheral(PeripheralEntry::new(
            "rcc",
            0x4002_1000,
            0x400,
            Box::new(Rcc::new()),
        ))?;
        bus.add_peripheral(
            PeripheralEntry::new("systick", 0xE000_E010, 0x10, Box::new(Systick::new()))
                .with_irq(Exception::SysTick),
        )?;
        bus.add_peripheral(PeripheralEntry::new(
            "nvic",
            0xE000_E100,
            0x400,
            Box::new(nvic),
        ))?;

        Ok(bus)
    }

    pub fn add_peripheral(&mut self, entry: PeripheralEntry) -> SimResult<()> {
        if let Some(other) = self.peripherals.iter().find(|p| p.overlaps(&entry)) {
            return Err(SimulationError::Overlap {
                name: entry.name,
                base: entry.base,
                other: other.name.clone(),
            });
        }
        tracing::debug!(
            "Bus: {} at {:#010x}..{:#010x}",
            entry.name,
            entry.base,
            entry.base.saturating_add(entry.size)
        );
        if entry.name == "rcc" {
            self.rcc = Some(self.peripherals.len());
        }
        self.peripherals.push(entry);
        Ok(())
    }

    pub fn core_hz(&self) -> u32 {
        self.core_hz
    }

    /// Core cycles since reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.cycles.saturating_mul(1_000_000) / self.core_hz as u64
    }

    pub fn idle_for(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step();
        }
    }

    pub fn vectors(&self) -> &VectorTable<SystemBus> {
        &self.vectors
    }

    pub fn vectors_mut(&mut self) -> &mut VectorTable<SystemBus> {
        &mut self.vectors
    }

    pub fn observe(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Call `action` once, with the cycle count, when the run reaches
    /// `limit` cycles. Polled loops have no other way out.
    pub fn set_watchdog(&mut self, limit: u64, action: impl FnMut(u64) + Send + 'static) {
        self.watchdog = Some(Watchdog {
            limit,
            action: Box::new(action),
        });
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut Trace {
        &mut self.trace
    }

    /// Handler runs for `exception` so far.
    pub fn interrupt_count(&self, exception: Exception) -> u64 {
        self.counts.get(exception.number()).copied().unwrap_or(0)
    }

    pub fn is_masked(&self) -> bool {
        self.masked > 0
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    fn gpio(&self, port: Port) -> Option<&GpioPort> {
        self.peripherals
            .iter()
            .find(|p| p.base == port.base())
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<GpioPort>())
    }

    fn gpio_mut(&mut self, port: Port) -> Option<&mut GpioPort> {
        self.peripherals
            .iter_mut()
            .find(|p| p.base == port.base())
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<GpioPort>())
    }

    /// Pad level of `pin`.
    pub fn pin_level(&self, pin: Pin) -> bool {
        self.gpio(pin.port)
            .map(|g| g.level(pin.index))
            .unwrap_or(false)
    }

    pub fn odr(&self, port: Port) -> u16 {
        self.gpio(port).map(GpioPort::odr).unwrap_or(0)
    }

    /// Drive an input pad from outside the chip.
    pub fn set_pin_input(&mut self, pin: Pin, high: bool) -> SimResult<()> {
        let port = self
            .gpio_mut(pin.port)
            .ok_or_else(|| SimulationError::UnknownPeripheral(format!("gpio{}", pin.port.letter())))?;
        port.set_input(pin.index, high);
        self.scan_pins();
        Ok(())
    }

    /// Set the 12-bit level the ADC samples on `channel`.
    pub fn set_analog_input(&mut self, channel: u8, value: u16) -> SimResult<()> {
        if channel as usize >= adc::CHANNELS {
            return Err(SimulationError::InvalidChannel(channel));
        }
        let adc = self
            .peripheral_mut::<Adc>("adc1")
            .ok_or_else(|| SimulationError::UnknownPeripheral("adc1".to_string()))?;
        adc.set_input(channel, value);
        Ok(())
    }

    fn find(&self, addr: u32) -> Option<usize> {
        self.peripherals.iter().position(|p| p.contains(addr))
    }

    fn enables(&self) -> (u32, u32) {
        self.rcc
            .and_then(|idx| self.peripherals.get(idx))
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<Rcc>())
            .map(|rcc| (rcc.apb1enr(), rcc.apb2enr()))
            .unwrap_or((u32::MAX, u32::MAX))
    }

    fn is_clocked(&self, idx: usize) -> bool {
        let (apb1, apb2) = self.enables();
        self.peripherals
            .get(idx)
            .map(|p| gate_open(p.gate, apb1, apb2))
            .unwrap_or(false)
    }

    fn tim3_remap(&self) -> Tim3Remap {
        self.peripheral::<Afio>("afio")
            .map(Afio::tim3_remap)
            .unwrap_or(Tim3Remap::None)
    }

    /// CH1..CH4 pins of the timer called `name`.
    fn channel_pins(&self, name: &str) -> Option<[Pin; 4]> {
        use Port::{A, B, C};
        let p = Pin::new;
        match name {
            "tim2" => Some([p(A, 0), p(A, 1), p(A, 2), p(A, 3)]),
            "tim3" => Some(match self.tim3_remap() {
                Tim3Remap::None => [p(A, 6), p(A, 7), p(B, 0), p(B, 1)],
                Tim3Remap::Partial => [p(B, 4), p(B, 5), p(B, 0), p(B, 1)],
                Tim3Remap::Full => [p(C, 6), p(C, 7), p(C, 8), p(C, 9)],
            }),
            "tim4" => Some([p(B, 6), p(B, 7), p(B, 8), p(B, 9)]),
            _ => None,
        }
    }

    fn drive_channels(&mut self, idx: usize, levels: [bool; 4]) {
        let Some(pins) = self.channel_pins(&self.peripherals[idx].name) else {
            return;
        };
        for (pin, level) in pins.into_iter().zip(levels) {
            if let Some(port) = self.gpio_mut(pin.port) {
                port.set_alternate(pin.index, level);
            }
        }
    }

    /// Compare pad levels against the last scan; record what changed.
    fn scan_pins(&mut self) {
        for port in Port::ALL {
            let Some(levels) = self.gpio(port).map(GpioPort::levels) else {
                continue;
            };
            let slot = port as usize;
            let changed = levels ^ self.pins[slot];
            if changed == 0 {
                continue;
            }
            self.pins[slot] = levels;
            for index in 0..16u8 {
                if changed & (1 << index) == 0 {
                    continue;
                }
                let pin = Pin::new(port, index);
                let high = levels & (1 << index) != 0;
                tracing::debug!(
                    "Bus: {} -> {} at cycle {}",
                    pin,
                    if high { "high" } else { "low" },
                    self.cycles
                );
                self.trace.record_pin(PinEvent {
                    cycle: self.cycles,
                    pin,
                    high,
                });
                for observer in &self.observers {
                    observer.on_pin_change(self.cycles, pin, high);
                }
            }
        }
    }

    /// One core cycle. Returns true if an exception was taken.
    fn step(&mut self) -> bool {
        self.cycles += 1;
        let (apb1, apb2) = self.enables();
        let mut pins_changed = false;

        for idx in 0..self.peripherals.len() {
            let (res, reroute) = {
                let entry = &mut self.peripherals[idx];
                if !gate_open(entry.gate, apb1, apb2) {
                    continue;
                }
                let res = entry.dev.tick();
                if res.irq {
                    match entry.irq {
                        Some(Exception::Irq(line)) => self.nvic.pend(line),
                        Some(Exception::SysTick) => self.systick_pending = true,
                        _ => {}
                    }
                }
                let reroute = res.outputs != entry.last_outputs || self.reroute;
                entry.last_outputs = res.outputs;
                (res, reroute)
            };

            if reroute {
                if let Some(levels) = res.outputs {
                    self.drive_channels(idx, levels);
                    pins_changed = true;
                }
            }
        }
        self.reroute = false;

        if pins_changed {
            self.scan_pins();
        }

        if self
            .watchdog
            .as_ref()
            .is_some_and(|w| self.cycles >= w.limit)
        {
            if let Some(mut watchdog) = self.watchdog.take() {
                tracing::error!("Bus: watchdog expired at cycle {}", self.cycles);
                (watchdog.action)(self.cycles);
            }
        }

        self.service()
    }

    fn has_pending(&self) -> bool {
        self.systick_pending || self.nvic.active().next().is_some()
    }

    /// SysTick first, then device lines by priority, then by number.
    fn next_pending(&self) -> Option<Exception> {
        if self.systick_pending {
            return Some(Exception::SysTick);
        }
        self.nvic
            .active()
            .min_by_key(|&line| (self.nvic.priority(line), line))
            .map(Exception::Irq)
    }

    fn clear_pending(&mut self, exception: Exception) {
        match exception {
            Exception::SysTick => self.systick_pending = false,
            Exception::Irq(line) => self.nvic.unpend(line),
            _ => {}
        }
    }

    fn service(&mut self) -> bool {
        if self.masked > 0 || self.in_handler {
            return false;
        }
        let mut taken = false;
        // Bounded: a handler that re-pends itself runs again next cycle.
        for _ in 0..VECTOR_COUNT {
            let Some(exception) = self.next_pending() else {
                break;
            };
            self.clear_pending(exception);
            self.dispatch(exception);
            taken = true;
        }
        taken
    }

    fn dispatch(&mut self, exception: Exception) {
        let cycle = self.cycles;
        let number = exception.number();
        let Some(handler) = self.vectors.get(exception) else {
            self.stats.unhandled += 1;
            if self.warned & (1 << number) == 0 {
                self.warned |= 1 << number;
                tracing::warn!("Bus: no handler for {}; pending bit cleared", exception);
            }
            return;
        };

        tracing::trace!("Bus: entering {} at cycle {}", exception, cycle);
        self.in_handler = true;
        handler(self);
        self.in_handler = false;

        if let Some(count) = self.counts.get_mut(number) {
            *count += 1;
        }
        self.trace.record_interrupt(InterruptEvent { cycle, exception });
        for observer in &self.observers {
            observer.on_interrupt(cycle, exception);
        }
    }

    pub fn snapshot(&self) -> BusSnapshot {
        let (apb1, apb2) = self.enables();
        BusSnapshot {
            cycles: self.cycles,
            core_hz: self.core_hz,
            peripherals: self
                .peripherals
                .iter()
                .map(|p| PeripheralSnapshot {
                    name: p.name.clone(),
                    base: p.base,
                    clocked: gate_open(p.gate, apb1, apb2),
                    state: p.dev.snapshot(),
                })
                .collect(),
            interrupts: self
                .counts
                .iter()
                .enumerate()
                .filter(|(_, count)| **count > 0)
                .filter_map(|(n, &count)| Exception::from_number(n).map(|e| (e.to_string(), count)))
                .collect(),
            pins: Port::ALL
                .iter()
                .filter_map(|&port| {
                    self.gpio(port)
                        .map(|g| (port.letter().to_string(), g.levels()))
                })
                .collect(),
            stats: self.stats,
        }
    }
}

impl Bus for SystemBus {
    fn read(&mut self, addr: u32) -> u32 {
        let Some(idx) = self.find(addr) else {
            tracing::warn!("Bus: read from unmapped address {:#010x}", addr);
            self.stats.unmapped_reads += 1;
            return 0;
        };
        if !self.is_clocked(idx) {
            tracing::debug!(
                "Bus: read of {} at {:#010x} with its clock off",
                self.peripherals[idx].name,
                addr
            );
            self.stats.gated_reads += 1;
            return 0;
        }
        let entry = &mut self.peripherals[idx];
        entry.dev.read(addr - entry.base)
    }

    fn write(&mut self, addr: u32, value: u32) {
        let Some(idx) = self.find(addr) else {
            tracing::warn!(
                "Bus: write of {:#010x} to unmapped address {:#010x}",
                value,
                addr
            );
            self.stats.unmapped_writes += 1;
            return;
        };
        if !self.is_clocked(idx) {
            let name = &self.peripherals[idx].name;
            tracing::warn!(
                "Bus: write to {} at {:#010x} ignored, clock not enabled",
                name,
                addr
            );
            self.stats.gated_writes += 1;
            for observer in &self.observers {
                observer.on_gated_write(self.cycles, name, addr);
            }
            return;
        }

        let entry = &mut self.peripherals[idx];
        entry.dev.write(addr - entry.base, value);
        if entry.drives_pins() {
            if entry.name == "afio" {
                self.reroute = true;
            }
            self.scan_pins();
        }
    }

    fn idle(&mut self) {
        self.step();
    }

    /// Sleeps until an exception is taken. With delivery masked, wakes on a
    /// pending one instead. Gives up after one simulated second.
    fn wait_for_interrupt(&mut self) {
        let start = self.cycles;
        let timeout = self.core_hz as u64;
        loop {
            if self.step() {
                return;
            }
            if self.masked > 0 && self.has_pending() {
                return;
            }
            if self.cycles - start >= timeout {
                tracing::debug!("Bus: WFI woke on timeout after {} cycles", timeout);
                return;
            }
        }
    }

    fn free<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.masked += 1;
        let result = f(self);
        self.masked -= 1;
        if self.masked == 0 {
            self.service();
        }
        result
    }
}

impl std::fmt::Debug for SystemBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBus")
            .field("core_hz", &self.core_hz)
            .field("cycles", &self.cycles)
            .field(
                "peripherals",
                &self.peripherals.iter().map(|p| &p.name).collect::<Vec<_>>(),
            )
            .field("vectors", &self.vectors)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use f1lab_hal::gpio::{self, PinMode, Speed};
    use f1lab_hal::rcc;

    const PC13: Pin = Pin::new(Port::C, 13);

    #[test]
    fn test_zero_clock_rejected() {
        assert!(matches!(
            SystemBus::new(0),
            Err(SimulationError::ZeroClock)
        ));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        let err = bus
            .add_peripheral(PeripheralEntry::new(
                "shadow",
                0x4000_0500,
                0x10,
                Box::new(Timer::new()),
            ))
            .unwrap_err();
        assert!(matches!(err, SimulationError::Overlap { ref other, .. } if other == "tim3"));
    }

    #[test]
    fn test_unmapped_access_reads_zero_and_counts() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        assert_eq!(bus.read(0x5000_0000), 0);
        bus.write(0x5000_0000, 1);
        assert_eq!(bus.stats().unmapped_reads, 1);
        assert_eq!(bus.stats().unmapped_writes, 1);
    }

    #[test]
    fn test_gpio_write_ignored_until_clock_enabled() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        gpio::configure(&mut bus, PC13, PinMode::PushPull(Speed::Mhz2));
        gpio::set_high(&mut bus, PC13);
        assert!(!bus.pin_level(PC13));
        assert_eq!(bus.stats().gated_writes, 2);

        rcc::enable(&mut bus, Apb2::IOPC);
        gpio::configure(&mut bus, PC13, PinMode::PushPull(Speed::Mhz2));
        gpio::set_high(&mut bus, PC13);
        assert!(bus.pin_level(PC13));
        assert_eq!(bus.trace().toggles(PC13), 1);
    }

    #[test]
    fn test_pin_event_stamped_with_write_cycle() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        rcc::enable(&mut bus, Apb2::IOPC);
        gpio::configure(&mut bus, PC13, PinMode::PushPull(Speed::Mhz2));
        bus.idle_for(25);
        gpio::set_high(&mut bus, PC13);
        assert_eq!(bus.trace().pin_events()[0].cycle, 25);
    }

    #[test]
    fn test_unhandled_interrupt_is_cleared_and_counted() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        f1lab_hal::nvic::enable(&mut bus, irq::TIM2);
        f1lab_hal::nvic::pend(&mut bus, irq::TIM2);
        bus.idle();
        assert_eq!(bus.stats().unhandled, 1);
        assert!(!bus.nvic.is_pending(irq::TIM2));
    }

    #[test]
    fn test_set_analog_input_rejects_missing_channel() {
        let mut bus = SystemBus::new(8_000_000).unwrap();
        assert!(bus.set_analog_input(7, 0x7FF).is_ok());
        assert!(matches!(
            bus.set_analog_input(18, 0),
            Err(SimulationError::InvalidChannel(18))
        ));
    }
}
