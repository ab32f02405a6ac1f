// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! GPIO ports with the F1 CRL/CRH nibble layout.
//!
//! Precondition for every function here: the port clock (`Apb2::IOPx`) is on.

use crate::bus::{Bus, Reg};
use crate::rcc::Apb2;
use core::fmt;

const GPIOA_BASE: u32 = 0x4001_0800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
}

impl Port {
    pub const ALL: [Port; 5] = [Port::A, Port::B, Port::C, Port::D, Port::E];

    pub const fn base(self) -> u32 {
        GPIOA_BASE + 0x400 * self as u32
    }

    pub const fn clock(self) -> Apb2 {
        match self {
            Port::A => Apb2::IOPA,
            Port::B => Apb2::IOPB,
            Port::C => Apb2::IOPC,
            Port::D => Apb2::IOPD,
            Port::E => Apb2::IOPE,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Port::A => 'A',
            Port::B => 'B',
            Port::C => 'C',
            Port::D => 'D',
            Port::E => 'E',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Port::A),
            'B' => Some(Port::B),
            'C' => Some(Port::C),
            'D' => Some(Port::D),
            'E' => Some(Port::E),
            _ => None,
        }
    }

    pub const fn crl(self) -> Reg {
        Reg::at(self.base() + 0x00)
    }

    pub const fn crh(self) -> Reg {
        Reg::at(self.base() + 0x04)
    }

    pub const fn idr(self) -> Reg {
        Reg::at(self.base() + 0x08)
    }

    pub const fn odr(self) -> Reg {
        Reg::at(self.base() + 0x0C)
    }

    pub const fn bsrr(self) -> Reg {
        Reg::at(self.base() + 0x10)
    }

    pub const fn brr(self) -> Reg {
        Reg::at(self.base() + 0x14)
    }

    pub const fn lckr(self) -> Reg {
        Reg::at(self.base() + 0x18)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin {
    pub port: Port,
    pub index: u8,
}

impl Pin {
    pub const fn new(port: Port, index: u8) -> Self {
        Self { port, index }
    }

    pub const fn mask(self) -> u32 {
        1 << self.index
    }

    /// Configuration register holding this pin's nibble, and the nibble's shift.
    const fn config_slot(self) -> (Reg, u32) {
        if self.index < 8 {
            (self.port.crl(), 4 * self.index as u32)
        } else {
            (self.port.crh(), 4 * (self.index as u32 - 8))
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}{}", self.port.letter(), self.index)
    }
}

/// Parses names like `PC13` or `pa5`.
impl core::str::FromStr for Pin {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        match chars.next() {
            Some('P') | Some('p') => {}
            _ => return Err(()),
        }
        let port = chars.next().and_then(Port::from_letter).ok_or(())?;
        let index: u8 = chars.as_str().parse().map_err(|_| ())?;
        if index > 15 {
            return Err(());
        }
        Ok(Pin::new(port, index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Mhz10 = 0b01,
    Mhz2 = 0b10,
    Mhz50 = 0b11,
}

/// CNF/MODE nibble values from the port configuration register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Analog,
    Floating,
    PullUpDown,
    PushPull(Speed),
    OpenDrain(Speed),
    AltPushPull(Speed),
    AltOpenDrain(Speed),
}

impl PinMode {
    pub const fn nibble(self) -> u32 {
        match self {
            PinMode::Analog => 0b0000,
            PinMode::Floating => 0b0100,
            PinMode::PullUpDown => 0b1000,
            PinMode::PushPull(s) => s as u32,
            PinMode::OpenDrain(s) => 0b0100 | s as u32,
            PinMode::AltPushPull(s) => 0b1000 | s as u32,
            PinMode::AltOpenDrain(s) => 0b1100 | s as u32,
        }
    }

    pub const fn from_nibble(nibble: u32) -> Self {
        let speed = match nibble & 0b11 {
            0b01 => Some(Speed::Mhz10),
            0b10 => Some(Speed::Mhz2),
            0b11 => Some(Speed::Mhz50),
            _ => None,
        };
        match (speed, (nibble >> 2) & 0b11) {
            (None, 0b00) => PinMode::Analog,
            (None, 0b01) => PinMode::Floating,
            // 0b11 is reserved in input mode; treated like pull-up/down.
            (None, _) => PinMode::PullUpDown,
            (Some(s), 0b00) => PinMode::PushPull(s),
            (Some(s), 0b01) => PinMode::OpenDrain(s),
            (Some(s), 0b10) => PinMode::AltPushPull(s),
            (Some(s), _) => PinMode::AltOpenDrain(s),
        }
    }

    pub const fn is_output(self) -> bool {
        matches!(self, PinMode::PushPull(_) | PinMode::OpenDrain(_))
    }

    pub const fn is_alternate(self) -> bool {
        matches!(self, PinMode::AltPushPull(_) | PinMode::AltOpenDrain(_))
    }
}

/// Rewrites the pin's nibble, leaving the other seven pins of the register alone.
pub fn configure<B: Bus>(bus: &mut B, pin: Pin, mode: PinMode) {
    let (reg, shift) = pin.config_slot();
    reg.write_field(bus, shift, 4, mode.nibble());
}

pub fn mode<B: Bus>(bus: &mut B, pin: Pin) -> PinMode {
    let (reg, shift) = pin.config_slot();
    PinMode::from_nibble(reg.read_field(bus, shift, 4))
}

/// BSRR write: atomic, no read-modify-write.
pub fn set_high<B: Bus>(bus: &mut B, pin: Pin) {
    pin.port.bsrr().write(bus, pin.mask());
}

/// BRR write: atomic, no read-modify-write.
pub fn set_low<B: Bus>(bus: &mut B, pin: Pin) {
    pin.port.brr().write(bus, pin.mask());
}

/// `ODR ^= bit`, a read-modify-write of the whole port.
pub fn toggle<B: Bus>(bus: &mut B, pin: Pin) {
    pin.port.odr().toggle_bits(bus, pin.mask());
}

pub fn set_odr_bit<B: Bus>(bus: &mut B, pin: Pin, high: bool) {
    if high {
        pin.port.odr().set_bits(bus, pin.mask());
    } else {
        pin.port.odr().clear_bits(bus, pin.mask());
    }
}

/// Output latch state of the pin.
pub fn is_set_high<B: Bus>(bus: &mut B, pin: Pin) -> bool {
    pin.port.odr().is_set(bus, pin.mask())
}

/// Sampled input level of the pin.
pub fn is_high<B: Bus>(bus: &mut B, pin: Pin) -> bool {
    pin.port.idr().is_set(bus, pin.mask())
}

/// An LED wired from 3.3 V to the pin: on when the pin sinks current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLowLed(pub Pin);

impl ActiveLowLed {
    pub fn setup<B: Bus>(self, bus: &mut B) {
        crate::rcc::enable(bus, self.0.port.clock());
        configure(bus, self.0, PinMode::PushPull(Speed::Mhz2));
    }

    pub fn on<B: Bus>(self, bus: &mut B) {
        set_low(bus, self.0);
    }

    pub fn off<B: Bus>(self, bus: &mut B) {
        set_high(bus, self.0);
    }

    pub fn toggle<B: Bus>(self, bus: &mut B) {
        toggle(bus, self.0);
    }

    pub fn is_on<B: Bus>(self, bus: &mut B) -> bool {
        !is_set_high(bus, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    #[test]
    fn test_port_bases_match_reference_manual() {
        assert_eq!(Port::A.base(), 0x4001_0800);
        assert_eq!(Port::B.base(), 0x4001_0C00);
        assert_eq!(Port::C.base(), 0x4001_1000);
        assert_eq!(Port::C.bsrr().addr(), 0x4001_1010);
        assert_eq!(Port::C.brr().addr(), 0x4001_1014);
    }

    #[test]
    fn test_pc13_push_pull_2mhz_sets_crh_nibble() {
        let mut bus = RecordingBus::default();
        configure(&mut bus, Pin::new(Port::C, 13), PinMode::PushPull(Speed::Mhz2));
        assert_eq!(Port::C.crh().read(&mut bus), 0x0020_0000);
    }

    #[test]
    fn test_pb1_alternate_push_pull_sets_crl_nibble() {
        let mut bus = RecordingBus::default();
        configure(&mut bus, Pin::new(Port::B, 1), PinMode::AltPushPull(Speed::Mhz2));
        assert_eq!(Port::B.crl().read(&mut bus), 0x0000_00A0);
    }

    #[test]
    fn test_nibble_decode_inverts_encode() {
        for mode in [
            PinMode::Analog,
            PinMode::Floating,
            PinMode::PullUpDown,
            PinMode::PushPull(Speed::Mhz50),
            PinMode::OpenDrain(Speed::Mhz10),
            PinMode::AltPushPull(Speed::Mhz2),
            PinMode::AltOpenDrain(Speed::Mhz50),
        ] {
            assert_eq!(PinMode::from_nibble(mode.nibble()), mode);
        }
    }

    #[test]
    fn test_pin_parse_and_display() {
        let pin: Pin = "pc13".parse().unwrap();
        assert_eq!(pin, Pin::new(Port::C, 13));
        assert_eq!(std::format!("{}", pin), "PC13");
        assert!("PF1".parse::<Pin>().is_err());
        assert!("PA16".parse::<Pin>().is_err());
    }
}
