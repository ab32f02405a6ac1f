use f1lab_hal::gpio::{Pin, Port};
use f1lab_hal::nvic::{self, irq};
use f1lab_hal::rcc::{self, Apb1};
use f1lab_hal::systick::{self, ClockSource};
use f1lab_hal::tim::TIM3;
use f1lab_hal::timing::{EventSource, IrqEvent, TimerConfig};
use f1lab_hal::vector::Exception;
use f1lab_hal::Bus;
use f1lab_sim::SystemBus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TIM3_IRQ: Exception = Exception::Irq(irq::TIM3);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn acknowledge(bus: &mut SystemBus) {
    TIM3.clear_update(bus);
}

fn ignore(_bus: &mut SystemBus) {}

/// TIM3 at 1 MHz, PSC 0, ARR 1000, update interrupt enabled.
fn tim3_bus(handler: fn(&mut SystemBus)) -> SystemBus {
    let mut bus = SystemBus::new(1_000_000).unwrap();
    bus.vectors_mut().register(TIM3_IRQ, handler);
    rcc::enable(&mut bus, Apb1::TIM3);
    let mut event = IrqEvent::timer(TIM3, TimerConfig::new(1_000_000, 0, 1000, true), 0x10);
    event.start(&mut bus);
    bus
}

#[test]
fn test_update_handler_runs_once_after_exactly_one_period() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);

    bus.idle_for(999);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 0);
    bus.idle();
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
    assert_eq!(bus.trace().interrupts()[0].cycle, 1000);
    assert!(!TIM3.is_update_pending(&mut bus));

    bus.idle_for(999);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
}

#[test]
fn test_handler_count_follows_period_formula() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    bus.idle_for(10_500);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 10);

    let cycles: Vec<u64> = bus.trace().interrupts().iter().map(|e| e.cycle).collect();
    assert!(cycles.windows(2).all(|w| w[1] - w[0] == 1000));
}

#[test]
fn test_unacknowledged_update_fires_again() {
    init_tracing();
    let mut bus = tim3_bus(ignore);
    bus.idle_for(1000);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
    bus.idle_for(3);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 4);
}

#[test]
fn test_disabled_line_leaves_update_pending() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    nvic::disable(&mut bus, irq::TIM3);
    bus.idle_for(2500);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 0);
    assert!(TIM3.is_update_pending(&mut bus));

    nvic::enable(&mut bus, irq::TIM3);
    bus.idle();
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
    assert!(!TIM3.is_update_pending(&mut bus));
}

#[test]
fn test_update_flag_without_interrupt_enable() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    TIM3.unlisten_update(&mut bus);
    bus.idle_for(1000);
    assert!(TIM3.is_update_pending(&mut bus));
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 0);

    TIM3.listen_update(&mut bus);
    bus.idle();
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
}

#[test]
fn test_timer_without_clock_is_inert() {
    init_tracing();
    let mut bus = SystemBus::new(1_000_000).unwrap();
    bus.vectors_mut().register(TIM3_IRQ, acknowledge);
    let mut event = IrqEvent::timer(TIM3, TimerConfig::new(1_000_000, 0, 1000, true), 0x10);
    event.start(&mut bus);

    bus.idle_for(5000);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 0);
    assert_eq!(TIM3.psc().read(&mut bus), 0);
    assert!(bus.stats().gated_writes > 0);

    // Enabling the clock later does not replay the lost writes.
    rcc::enable(&mut bus, Apb1::TIM3);
    assert_eq!(TIM3.arr().read(&mut bus), 0xFFFF);
}

#[test]
fn test_configure_twice_leaves_same_image() {
    init_tracing();
    let config = TimerConfig::new(1_000_000, 0, 1000, true);
    let mut bus = tim3_bus(acknowledge);
    let image = |bus: &mut SystemBus| {
        [
            TIM3.cr1().read(bus),
            TIM3.dier().read(bus),
            TIM3.psc().read(bus),
            TIM3.arr().read(bus),
        ]
    };
    let first = image(&mut bus);
    TIM3.configure(&mut bus, &config);
    assert_eq!(image(&mut bus), first);

    bus.idle_for(1000);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
}

#[test]
fn test_free_defers_dispatch_until_exit() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    let inside = bus.free(|bus| {
        bus.idle_for(1500);
        assert!(bus.is_masked());
        bus.interrupt_count(TIM3_IRQ)
    });
    assert_eq!(inside, 0);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
    assert_eq!(bus.trace().interrupts()[0].cycle, 1500);
}

#[test]
fn test_wait_for_interrupt_returns_after_handler() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    bus.wait_for_interrupt();
    assert_eq!(bus.cycles(), 1000);
    assert_eq!(bus.interrupt_count(TIM3_IRQ), 1);
}

#[test]
fn test_wait_for_interrupt_times_out_without_sources() {
    init_tracing();
    let mut bus = SystemBus::new(1000).unwrap();
    bus.wait_for_interrupt();
    assert_eq!(bus.cycles(), 1000);
}

#[test]
fn test_systick_countflag_clears_on_read() {
    init_tracing();
    let mut bus = SystemBus::new(1_000_000).unwrap();
    systick::configure(&mut bus, ClockSource::Processor, 99, false);
    bus.idle_for(100);
    assert!(systick::has_wrapped(&mut bus));
    assert!(!systick::has_wrapped(&mut bus));
}

#[test]
fn test_systick_period_is_reload_plus_one() {
    init_tracing();
    let mut bus = SystemBus::new(1_000_000).unwrap();
    systick::configure(&mut bus, ClockSource::Processor, 499, false);
    let mut wraps = Vec::new();
    for _ in 0..2000 {
        bus.idle();
        if systick::has_wrapped(&mut bus) {
            wraps.push(bus.cycles());
        }
    }
    assert_eq!(wraps, [500, 1000, 1500, 2000]);
}

#[test]
fn test_systick_counts_down_and_stops_when_disabled() {
    init_tracing();
    let mut bus = SystemBus::new(1_000_000).unwrap();
    systick::configure(&mut bus, ClockSource::Processor, 499, false);
    bus.idle_for(11);
    assert_eq!(systick::current(&mut bus), 489);

    systick::disable(&mut bus);
    bus.idle_for(1000);
    assert_eq!(systick::current(&mut bus), 489);
    assert!(!systick::has_wrapped(&mut bus));
}

#[test]
fn test_analog_input_reaches_data_register() {
    init_tracing();
    let mut bus = SystemBus::new(8_000_000).unwrap();
    rcc::enable(&mut bus, rcc::Apb2::ADC1);
    bus.set_analog_input(7, 0x07FF).unwrap();
    f1lab_hal::adc::configure_single(&mut bus, 7);
    f1lab_hal::adc::calibrate(&mut bus);
    assert_eq!(f1lab_hal::adc::read_blocking(&mut bus), 0x07FF);
}

#[test]
fn test_watchdog_fires_once_at_limit() {
    init_tracing();
    let fired = Arc::new(AtomicU64::new(0));
    let seen = fired.clone();
    let mut bus = SystemBus::new(1_000_000).unwrap();
    bus.set_watchdog(750, move |cycle| {
        seen.fetch_add(cycle, Ordering::SeqCst);
    });
    bus.idle_for(2000);
    assert_eq!(fired.load(Ordering::SeqCst), 750);
}

#[test]
fn test_external_input_visible_in_idr() {
    init_tracing();
    let pa0 = Pin::new(Port::A, 0);
    let mut bus = SystemBus::new(8_000_000).unwrap();
    rcc::enable(&mut bus, rcc::Apb2::IOPA);
    bus.set_pin_input(pa0, true).unwrap();
    assert!(f1lab_hal::gpio::is_high(&mut bus, pa0));
    assert_eq!(bus.trace().toggles(pa0), 1);
}

#[test]
fn test_snapshot_reports_clock_state_and_counts() {
    init_tracing();
    let mut bus = tim3_bus(acknowledge);
    bus.idle_for(2000);
    let snapshot = bus.snapshot();
    assert_eq!(snapshot.cycles, 2000);
    assert_eq!(snapshot.interrupts.get("TIM3"), Some(&2));
    assert!(snapshot.peripheral("tim3").unwrap().clocked);
    assert!(!snapshot.peripheral("adc1").unwrap().clocked);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["peripherals"][1]["name"], "tim3");
}
