// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Peripheral;
use f1lab_hal::afio::Tim3Remap;
use std::any::Any;

/// STM32F1 Alternate Function I/O (AFIO)
#[derive(Debug, Default, serde::Serialize)]
pub struct Afio {
    pub evcr: u32,
    pub mapr: u32,
    pub exticr: [u32; 4],
}

impl Afio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tim3_remap(&self) -> Tim3Remap {
        Tim3Remap::from_bits(self.mapr >> 10)
    }
}

impl Peripheral for Afio {
    fn read(&mut self, offset: u32) -> u32 {
        self.peek(offset)
    }

    fn peek(&self, offset: u32) -> u32 {
        match offset {
            0x00 => self.evcr,
            // SWJ_CFG (26:24) is write-only.
            0x04 => self.mapr & !0x0700_0000,
            0x08 => self.exticr[0],
            0x0C => self.exticr[1],
            0x10 => self.exticr[2],
            0x14 => self.exticr[3],
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => self.evcr = value & 0xFF,
            0x04 => {
                if (value ^ self.mapr) & (0b11 << 10) != 0 {
                    tracing::debug!("AFIO: TIM3 remap -> {:?}", Tim3Remap::from_bits(value >> 10));
                }
                self.mapr = value;
            }
            0x08 => self.exticr[0] = value & 0xFFFF,
            0x0C => self.exticr[1] = value & 0xFFFF,
            0x10 => self.exticr[2] = value & 0xFFFF,
            0x14 => self.exticr[3] = value & 0xFFFF,
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
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
