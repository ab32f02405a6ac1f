// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use f1lab_hal::app::AdcThreshold;
use f1lab_hal::App;
use panic_halt as _;

#[entry]
fn main() -> ! {
    let mut bus = firmware_f103::bus();
    AdcThreshold::default().run(&mut bus)
}
