// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register-level access to the STM32F103 peripherals used by the F1Lab
//! programs, written once against the [`bus::Bus`] trait.
//!
//! The same code runs on the chip through [`bus::Mmio`] and on the host
//! through the `f1lab-sim` system bus.

#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod afio;
pub mod app;
pub mod bus;
pub mod gpio;
pub mod nvic;
pub mod rcc;
pub mod systick;
pub mod tim;
pub mod timing;
pub mod vector;

pub use app::{App, Program};
pub use bus::{Bus, Mmio, Reg};
