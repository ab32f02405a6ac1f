// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Peripheral;
use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Device interrupt lines implemented by the F103 (two register banks).
pub const LINES: usize = 64;
const BANKS: usize = LINES / 32;

/// Shared state for NVIC registers.
#[derive(Debug)]
pub struct NvicState {
    pub iser: [AtomicU32; BANKS],
    pub ispr: [AtomicU32; BANKS],
    pub ipr: [AtomicU8; LINES],
}

impl Default for NvicState {
    fn default() -> Self {
        Self {
            iser: std::array::from_fn(|_| AtomicU32::new(0)),
            ispr: std::array::from_fn(|_| AtomicU32::new(0)),
            ipr: std::array::from_fn(|_| AtomicU8::new(0)),
        }
    }
}

impl NvicState {
    pub fn is_enabled(&self, irq: u8) -> bool {
        self.bit(&self.iser, irq)
    }

    pub fn is_pending(&self, irq: u8) -> bool {
        self.bit(&self.ispr, irq)
    }

    pub fn pend(&self, irq: u8) {
        if let Some(bank) = self.ispr.get(irq as usize / 32) {
            bank.fetch_or(1 << (irq % 32), Ordering::SeqCst);
        }
    }

    pub fn unpend(&self, irq: u8) {
        if let Some(bank) = self.ispr.get(irq as usize / 32) {
            bank.fetch_and(!(1 << (irq % 32)), Ordering::SeqCst);
        }
    }

    pub fn priority(&self, irq: u8) -> u8 {
        self.ipr
            .get(irq as usize)
            .map(|p| p.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Lines both enabled and pending, lowest number first.
    pub fn active(&self) -> impl Iterator<Item = u8> + '_ {
        (0..BANKS).flat_map(move |bank| {
            let ready =
                self.iser[bank].load(Ordering::SeqCst) & self.ispr[bank].load(Ordering::SeqCst);
            (0..32u8)
                .filter(move |bit| ready & (1 << bit) != 0)
                .map(move |bit| bank as u8 * 32 + bit)
        })
    }

    fn bit(&self, regs: &[AtomicU32; BANKS], irq: u8) -> bool {
        regs.get(irq as usize / 32)
            .map(|r| r.load(Ordering::SeqCst) & (1 << (irq % 32)) != 0)
            .unwrap_or(false)
    }
}

/// Nested Vectored Interrupt Controller, mapped at 0xE000_E100.
#[derive(Debug, Clone)]
pub struct Nvic {
    pub state: Arc<NvicState>,
}

impl Nvic {
    pub fn new(state: Arc<NvicState>) -> Self {
        Self { state }
    }
}

impl Peripheral for Nvic {
    fn read(&mut self, offset: u32) -> u32 {
        self.peek(offset)
    }

    fn peek(&self, offset: u32) -> u32 {
        let idx = ((offset % 0x80) / 4) as usize;
        match offset {
            // ISER and ICER both read the enable bits.
            0x000..=0x0FF if idx < BANKS => self.state.iser[idx].load(Ordering::SeqCst),
            0x100..=0x1FF if idx < BANKS => self.state.ispr[idx].load(Ordering::SeqCst),
            0x300..=0x33F => {
                let line = (offset - 0x300) as usize;
                (0..4).fold(0u32, |word, byte| {
                    word | (self.state.priority((line + byte) as u8) as u32) << (8 * byte)
                })
            }
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        let idx = ((offset % 0x80) / 4) as usize;
        match offset {
            // ISER: Writing 1 sets the enable bit
            0x000..=0x07F if idx < BANKS => {
                self.state.iser[idx].fetch_or(value, Ordering::SeqCst);
            }
            // ICER: Writing 1 clears the enable bit
            0x080..=0x0FF if idx < BANKS => {
                self.state.iser[idx].fetch_and(!value, Ordering::SeqCst);
            }
            // ISPR: Writing 1 sets the pending bit
            0x100..=0x17F if idx < BANKS => {
                self.state.ispr[idx].fetch_or(value, Ordering::SeqCst);
            }
            // ICPR: Writing 1 clears the pending bit
            0x180..=0x1FF if idx < BANKS => {
                self.state.ispr[idx].fetch_and(!value, Ordering::SeqCst);
            }
            0x300..=0x33F => {
                let line = (offset - 0x300) as usize;
                for byte in 0..4 {
                    // Only the upper four priority bits are implemented.
                    let priority = (value >> (8 * byte)) as u8 & 0xF0;
                    if let Some(slot) = self.state.ipr.get(line + byte) {
                        slot.store(priority, Ordering::SeqCst);
                    }
                }
            }
            _ => {}
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let iser: Vec<u32> = self
            .state
            .iser
            .iter()
            .map(|a| a.load(Ordering::Relaxed))
            .collect();
        let ispr: Vec<u32> = self
            .state
            .ispr
            .iter()
            .map(|a| a.load(Ordering::Relaxed))
            .collect();
        serde_json::json!({
            "iser": iser,
            "ispr": ispr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear_enable_are_write_one() {
        let mut nvic = Nvic::new(Arc::new(NvicState::default()));
        nvic.write(0x000, 1 << 29);
        nvic.write(0x000, 1 << 28);
        assert!(nvic.state.is_enabled(29));
        assert!(nvic.state.is_enabled(28));

        nvic.write(0x080, 1 << 28);
        assert!(nvic.state.is_enabled(29));
        assert!(!nvic.state.is_enabled(28));
        assert_eq!(nvic.read(0x080), 1 << 29);
    }

    #[test]
    fn test_active_lines_need_enable_and_pending() {
        let state = Arc::new(NvicState::default());
        let mut nvic = Nvic::new(state.clone());
        state.pend(29);
        state.pend(18);
        assert_eq!(state.active().count(), 0);

        nvic.write(0x000, (1 << 29) | (1 << 18));
        assert_eq!(state.active().collect::<Vec<_>>(), [18, 29]);

        nvic.write(0x180, 1 << 18);
        assert_eq!(state.active().collect::<Vec<_>>(), [29]);
    }

    #[test]
    fn test_priority_keeps_upper_nibble() {
        let mut nvic = Nvic::new(Arc::new(NvicState::default()));
        nvic.write(0x31C, 0x0000_1F00);
        assert_eq!(nvic.state.priority(29), 0x10);
        assert_eq!(nvic.read(0x31C), 0x0000_1000);
    }
}
