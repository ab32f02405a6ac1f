// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Word-wide access to the memory-mapped register space.
///
/// Every call reaches the backend: nothing is cached between accesses, and
/// nothing is validated. A bit pattern the reference manual calls reserved is
/// written exactly as given.
pub trait Bus {
    fn read(&mut self, addr: u32) -> u32;
    fn write(&mut self, addr: u32, value: u32);

    /// One idle iteration of a spin loop.
    fn idle(&mut self) {}

    /// Halt the calling context until an interrupt has been serviced.
    fn wait_for_interrupt(&mut self) {
        self.idle();
    }

    /// Run `f` with interrupt delivery masked.
    fn free<R, F>(&mut self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> R,
    {
        f(self)
    }

    fn modify<F>(&mut self, addr: u32, f: F)
    where
        Self: Sized,
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(addr);
        self.write(addr, f(value));
    }

    fn set_bits(&mut self, addr: u32, mask: u32)
    where
        Self: Sized,
    {
        self.modify(addr, |v| v | mask);
    }

    fn clear_bits(&mut self, addr: u32, mask: u32)
    where
        Self: Sized,
    {
        self.modify(addr, |v| v & !mask);
    }

    fn toggle_bits(&mut self, addr: u32, mask: u32)
    where
        Self: Sized,
    {
        self.modify(addr, |v| v ^ mask);
    }
}

/// A single 32-bit register at a fixed absolute address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(u32);

impl Reg {
    pub const fn at(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn read<B: Bus>(self, bus: &mut B) -> u32 {
        bus.read(self.0)
    }

    #[inline]
    pub fn write<B: Bus>(self, bus: &mut B, value: u32) {
        bus.write(self.0, value)
    }

    #[inline]
    pub fn modify<B: Bus, F: FnOnce(u32) -> u32>(self, bus: &mut B, f: F) {
        bus.modify(self.0, f)
    }

    #[inline]
    pub fn set_bits<B: Bus>(self, bus: &mut B, mask: u32) {
        bus.set_bits(self.0, mask)
    }

    #[inline]
    pub fn clear_bits<B: Bus>(self, bus: &mut B, mask: u32) {
        bus.clear_bits(self.0, mask)
    }

    #[inline]
    pub fn toggle_bits<B: Bus>(self, bus: &mut B, mask: u32) {
        bus.toggle_bits(self.0, mask)
    }

    /// Replace the `width`-bit field at `shift` with `value`.
    #[inline]
    pub fn write_field<B: Bus>(self, bus: &mut B, shift: u32, width: u32, value: u32) {
        let mask = field_mask(width) << shift;
        bus.modify(self.0, |v| (v & !mask) | ((value << shift) & mask))
    }

    #[inline]
    pub fn read_field<B: Bus>(self, bus: &mut B, shift: u32, width: u32) -> u32 {
        (bus.read(self.0) >> shift) & field_mask(width)
    }

    #[inline]
    pub fn is_set<B: Bus>(self, bus: &mut B, mask: u32) -> bool {
        bus.read(self.0) & mask != 0
    }
}

const fn field_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Volatile access to the real peripheral space of the running chip.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Only valid on the target, where every address handed to the bus is a
    /// mapped peripheral register. Several instances may coexist (main loop
    /// and handlers); the ownership of individual bits is by convention.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Bus for Mmio {
    #[inline]
    fn read(&mut self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    #[inline]
    fn write(&mut self, addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }

    #[inline]
    fn idle(&mut self) {
        cortex_m::asm::nop();
    }

    #[inline]
    fn wait_for_interrupt(&mut self) {
        cortex_m::asm::wfi();
    }

    fn free<R, F>(&mut self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> R,
    {
        cortex_m::interrupt::free(|_| f(self))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingBus;
    use super::{Bus, Reg};

    #[test]
    fn test_modify_is_single_read_then_single_write() {
        let mut bus = RecordingBus::default();
        bus.words.insert(0x4001_100C, 0x0000_2001);
        bus.toggle_bits(0x4001_100C, 1 << 13);
        assert_eq!(bus.writes, [(0x4001_100C, 0x0000_0001)]);
    }

    #[test]
    fn test_write_field_replaces_only_the_field() {
        let mut bus = RecordingBus::default();
        let crh = Reg::at(0x4001_1004);
        crh.write(&mut bus, 0x4444_4444);
        crh.write_field(&mut bus, 20, 4, 0x2);
        assert_eq!(crh.read(&mut bus), 0x4424_4444);
        assert_eq!(crh.read_field(&mut bus, 20, 4), 0x2);
    }

    #[test]
    fn test_default_wait_for_interrupt_idles_once() {
        let mut bus = RecordingBus::default();
        bus.wait_for_interrupt();
        assert_eq!(bus.idles, 1);
    }
}
