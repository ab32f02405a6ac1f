// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use f1lab_hal::app::{on_tim3_update, Timer3Irq};
use f1lab_hal::App;
use panic_halt as _;

#[entry]
fn main() -> ! {
    let mut bus = firmware_f103::bus();
    Timer3Irq::default().run(&mut bus)
}

#[no_mangle]
pub extern "C" fn TIM3() {
    on_tim3_update(&mut firmware_f103::bus());
}
