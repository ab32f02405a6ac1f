// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{board, App};
use crate::adc;
use crate::bus::Bus;
use crate::gpio::{self, ActiveLowLed, Pin, PinMode};
use crate::rcc::{self, Apb2};
use crate::timing::{BusyWait, EventSource};

/// One software-started conversion per pass; the LED shows whether the
/// sample is below `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcThreshold {
    pub led: ActiveLowLed,
    pub pin: Pin,
    pub channel: u8,
    pub threshold: u16,
    /// Most recent sample, `None` before the first pass.
    pub last: Option<u16>,
}

impl AdcThreshold {
    /// Power-up stabilisation after ADON, in loop iterations.
    pub const STABILIZE_ITERATIONS: u32 = 50;

    pub const fn new(threshold: u16) -> Self {
        Self {
            led: board::LED,
            pin: board::ANALOG_PIN,
            channel: board::ANALOG_CHANNEL,
            threshold,
            last: None,
        }
    }

    /// LED on (pin low) strictly below the threshold.
    pub const fn led_on_for(&self, sample: u16) -> bool {
        sample < self.threshold
    }
}

impl Default for AdcThreshold {
    fn default() -> Self {
        Self::new(board::ADC_THRESHOLD)
    }
}

impl<B: Bus> App<B> for AdcThreshold {
    fn init(&mut self, bus: &mut B) {
        rcc::enable(bus, Apb2::AFIO | self.pin.port.clock() | Apb2::ADC1);
        self.led.setup(bus);
        gpio::configure(bus, self.pin, PinMode::Analog);

        adc::configure_single(bus, self.channel);
        BusyWait::new(Self::STABILIZE_ITERATIONS).wait(bus);
        adc::calibrate(bus);
    }

    fn poll(&mut self, bus: &mut B) {
        let sample = adc::read_blocking(bus);
        self.last = Some(sample);
        if self.led_on_for(sample) {
            self.led.on(bus);
        } else {
            self.led.off(bus);
        }
        adc::clear_status(bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;
    use crate::gpio::Port;

    #[test]
    fn test_threshold_boundary() {
        let app = AdcThreshold::default();
        assert!(app.led_on_for(0x7FF));
        assert!(!app.led_on_for(0x800));
        assert!(app.led_on_for(0));
        assert!(!app.led_on_for(0xFFF));
    }

    #[test]
    fn test_poll_drives_led_from_sample() {
        let mut bus = RecordingBus::default();
        let mut app = AdcThreshold::default();
        adc::SR.write(&mut bus, adc::SR_STRT | adc::SR_EOC);
        adc::DR.write(&mut bus, 0x0123);
        app.poll(&mut bus);
        assert_eq!(app.last, Some(0x0123));
        let brr = (Port::C.brr().addr(), 1 << 13);
        assert_eq!(bus.writes[bus.writes.len() - 2], brr);
        assert_eq!(adc::SR.read(&mut bus), 0);
    }
}
