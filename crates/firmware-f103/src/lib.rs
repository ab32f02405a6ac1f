// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Device interrupt table for the STM32F103 and the bus the firmware images
//! run on.
//!
//! A program overrides a device interrupt by defining a `#[no_mangle]`
//! function with the vector's name (`TIM3`); `device.x` points every other
//! name at `DefaultHandler`.

#![no_std]

use f1lab_hal::nvic::irq;
use f1lab_hal::vector::DEVICE_VECTORS;
use f1lab_hal::Mmio;

type Handler = unsafe extern "C" fn();

extern "C" {
    fn DefaultHandler();
    fn TIM2();
    fn TIM3();
    fn TIM4();
    fn ADC1_2();
}

#[link_section = ".vector_table.interrupts"]
#[no_mangle]
pub static __INTERRUPTS: [Handler; DEVICE_VECTORS] = {
    let mut table = [DefaultHandler as Handler; DEVICE_VECTORS];
    table[irq::ADC1_2 as usize] = ADC1_2;
    table[irq::TIM2 as usize] = TIM2;
    table[irq::TIM3 as usize] = TIM3;
    table[irq::TIM4 as usize] = TIM4;
    table
};

/// The peripheral bus of the running chip.
///
/// Main loop and handlers each take their own; they share state only
/// through registers.
#[inline]
pub fn bus() -> Mmio {
    // SAFETY: the firmware only runs on the STM32F103.
    unsafe { Mmio::steal() }
}
