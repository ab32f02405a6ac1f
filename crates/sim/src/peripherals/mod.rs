// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod adc;
pub mod afio;
pub mod gpio;
pub mod nvic;
pub mod rcc;
pub mod systick;
pub mod timer;
