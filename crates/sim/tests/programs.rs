use f1lab_hal::app::{
    AdcThreshold, Blink, BlinkOdr, BlinkXor, Pwm, SysTickIrq, SysTickPoll, Timer3Irq, Timer3Poll,
};
use f1lab_hal::gpio::{Pin, Port};
use f1lab_hal::nvic::irq;
use f1lab_hal::systick::ClockSource;
use f1lab_hal::tim::{Channel, TIM3};
use f1lab_hal::timing::{BusyWait, TimerConfig};
use f1lab_hal::vector::Exception;
use f1lab_sim::{Machine, SimulationObserver, SystemBus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const PC13: Pin = Pin::new(Port::C, 13);
const PB1: Pin = Pin::new(Port::B, 1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn machine(core_hz: u32, app: impl f1lab_hal::App<SystemBus> + 'static) -> anyhow::Result<Machine> {
    init_tracing();
    let bus = SystemBus::new(core_hz)?;
    Ok(Machine::new(bus, Box::new(app)))
}

#[test]
fn test_blink_busy_wait_shape() -> anyhow::Result<()> {
    let app = Blink {
        off: BusyWait::new(800),
        on: BusyWait::new(200),
        ..Blink::default()
    };
    let mut m = machine(1_000_000, app)?;
    m.run_for(3000);

    let events = m.bus.trace().pin_events();
    let shape: Vec<(u64, bool)> = events.iter().map(|e| (e.cycle, e.high)).collect();
    assert_eq!(
        shape,
        [
            (0, true),
            (800, false),
            (1000, true),
            (1800, false),
            (2000, true),
            (2800, false)
        ]
    );
    assert_eq!(m.polls(), 3);
    Ok(())
}

#[test]
fn test_blink_on_other_pin_leaves_led_alone() -> anyhow::Result<()> {
    let pa5 = Pin::new(Port::A, 5);
    let app = Blink {
        off: BusyWait::new(10),
        on: BusyWait::new(10),
        ..Blink::new(pa5)
    };
    let mut m = machine(1_000_000, app)?;
    m.run_for(100);
    assert_eq!(m.bus.trace().toggles(pa5), 10);
    assert_eq!(m.bus.trace().toggles(PC13), 0);
    Ok(())
}

#[test]
fn test_blink_xor_toggle_parity() -> anyhow::Result<()> {
    let app = BlinkXor {
        delay: BusyWait::new(100),
        ..BlinkXor::default()
    };
    let mut m = machine(1_000_000, app)?;
    let initial = m.bus.pin_level(PC13);

    m.run_for(1000);
    assert_eq!(m.bus.trace().toggles(PC13), 10);
    assert_eq!(m.bus.pin_level(PC13), initial);
    assert!(m.bus.trace().intervals(PC13).iter().all(|&d| d == 100));

    m.run_for(100);
    assert_ne!(m.bus.pin_level(PC13), initial);
    Ok(())
}

#[test]
fn test_blink_odr_short_high_long_low() -> anyhow::Result<()> {
    let app = BlinkOdr {
        off: BusyWait::new(100),
        on: BusyWait::new(500),
        ..BlinkOdr::default()
    };
    let mut m = machine(1_000_000, app)?;
    m.run_for(1800);

    let shape: Vec<(u64, bool)> = m
        .bus
        .trace()
        .pin_events()
        .iter()
        .map(|e| (e.cycle, e.high))
        .collect();
    assert_eq!(
        shape,
        [
            (0, true),
            (100, false),
            (600, true),
            (700, false),
            (1200, true),
            (1300, false)
        ]
    );
    assert_eq!(m.bus.trace().duty(PC13), (300, 1000));
    Ok(())
}

#[test]
fn test_systick_poll_toggles_every_period() -> anyhow::Result<()> {
    let app = SysTickPoll::new(ClockSource::Processor, 1_000_000, 2);
    let mut m = machine(1_000_000, app)?;
    m.run_for(10_000);
    let intervals = m.bus.trace().intervals(PC13);
    assert!(intervals.len() >= 4);
    assert!(intervals.iter().all(|&d| d == 2000), "{:?}", intervals);
    Ok(())
}

#[test]
fn test_systick_irq_period_on_external_clock() -> anyhow::Result<()> {
    let app = SysTickIrq::new(ClockSource::External, 99);
    let mut m = machine(1_000_000, app)?;
    m.run_for(4000);

    let interrupts = m.bus.trace().interrupts();
    assert_eq!(interrupts[0].cycle, 800);
    assert_eq!(m.bus.interrupt_count(Exception::SysTick), 5);
    assert_eq!(m.bus.trace().toggles(PC13), 5);
    Ok(())
}

#[test]
fn test_timer3_poll_counts_milliseconds() -> anyhow::Result<()> {
    let app = Timer3Poll::new(1_000_000, 3);
    let mut m = machine(1_000_000, app)?;
    m.run_for(12_000);
    let intervals = m.bus.trace().intervals(PC13);
    assert_eq!(intervals, [3000, 3000, 3000]);
    Ok(())
}

#[test]
fn test_timer3_irq_end_to_end() -> anyhow::Result<()> {
    let app = Timer3Irq::new(TimerConfig::new(1_000_000, 0, 1000, true));
    let mut m = machine(1_000_000, app)?;
    m.run_for(1000);

    let tim3 = Exception::Irq(irq::TIM3);
    assert_eq!(m.bus.interrupt_count(tim3), 1);
    assert_eq!(m.bus.trace().interrupts()[0].cycle, 1000);
    assert!(m.bus.pin_level(PC13));
    assert!(!TIM3.is_update_pending(&mut m.bus));

    m.run_for(4000);
    assert_eq!(m.bus.interrupt_count(tim3), 5);
    assert!(m.bus.pin_level(PC13));
    Ok(())
}

#[test]
fn test_pwm_duty_and_compare_handler() -> anyhow::Result<()> {
    let app = Pwm::new(TimerConfig::new(1_000_000, 0, 1000, false), 100);
    let mut m = machine(1_000_000, app)?;
    m.run_for(5000);

    // Inverted PWM1: low while CNT < CCR4.
    let (high, low) = m.bus.trace().duty(PB1);
    assert!(low > 0);
    assert_eq!(high, 9 * low);

    let led = m.bus.trace().intervals(PC13);
    assert!(!led.is_empty());
    assert!(led.iter().all(|&d| d == 1000));
    assert_eq!(
        m.bus.interrupt_count(Exception::Irq(irq::TIM3)),
        m.bus.trace().toggles(PC13)
    );
    assert!(!TIM3.is_compare_pending(&mut m.bus, Channel::C4));
    Ok(())
}

#[test]
fn test_toggle_counts_exact_after_trace_fills() -> anyhow::Result<()> {
    let app = Pwm::new(TimerConfig::new(1_000_000, 0, 10, false), 5);
    let mut m = machine(1_000_000, app)?;
    *m.bus.trace_mut() = f1lab_sim::trace::Trace::with_limit(16);
    m.run_for(2000);

    let trace = m.bus.trace();
    assert_eq!(trace.pin_events().len(), 16);
    assert!(trace.dropped() > 0);
    assert_eq!(
        m.bus.interrupt_count(Exception::Irq(irq::TIM3)),
        trace.toggles(PC13)
    );
    assert!(trace.toggles(PC13) > 16);
    assert!(trace.toggles(PB1) > 16);
    Ok(())
}

#[test]
fn test_adc_threshold_drives_led() -> anyhow::Result<()> {
    init_tracing();
    let mut bus = SystemBus::new(8_000_000)?;
    bus.set_analog_input(7, 0x07FF)?;
    let mut m = Machine::new(bus, Box::new(AdcThreshold::default()));

    m.run_for(100);
    // LED is active low: on means the pin is low.
    assert!(!m.bus.pin_level(PC13));

    m.bus.set_analog_input(7, 0x0800)?;
    m.run_for(100);
    assert!(m.bus.pin_level(PC13));

    m.bus.set_analog_input(7, 0x0000)?;
    m.run_for(100);
    assert!(!m.bus.pin_level(PC13));
    Ok(())
}

#[derive(Debug, Default)]
struct Counter {
    pins: AtomicU64,
    interrupts: AtomicU64,
}

impl SimulationObserver for Counter {
    fn on_pin_change(&self, _cycle: u64, _pin: Pin, _high: bool) {
        self.pins.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interrupt(&self, _cycle: u64, _exception: Exception) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_observer_sees_what_trace_records() -> anyhow::Result<()> {
    init_tracing();
    let counter = Arc::new(Counter::default());
    let mut bus = SystemBus::new(1_000_000)?;
    bus.observe(counter.clone());
    let app = Timer3Irq::new(TimerConfig::new(1_000_000, 0, 500, true));
    let mut m = Machine::new(bus, Box::new(app));
    m.run_for(5000);

    assert_eq!(counter.interrupts.load(Ordering::SeqCst), 10);
    assert_eq!(
        counter.pins.load(Ordering::SeqCst),
        m.bus.trace().pin_events().len() as u64
    );
    Ok(())
}
