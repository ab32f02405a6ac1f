// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use f1lab_config::{Check, ConfigError, Expectation, Scenario};
use f1lab_hal::gpio::{Pin, Port};
use f1lab_hal::nvic::irq;
use f1lab_hal::systick::ClockSource;
use f1lab_hal::vector::Exception;
use f1lab_hal::Program;

const FULL: &str = r#"
schema_version: "1.0"
name: timer3-blink
program: timer3-irq
clock: "8MHz"
run:
  cycles: 16000000
params:
  prescaler: 7999
  reload: 1000
analog:
  7: 0x7FF
expect:
  - pin: PC13
    toggles: 2
  - pin: PC13
    level: low
  - vector: TIM3
    count: 2
"#;

#[test]
fn test_full_scenario_resolves() -> anyhow::Result<()> {
    let scenario = Scenario::from_yaml(FULL)?;
    assert_eq!(scenario.expect.len(), 3);
    assert!(matches!(scenario.expect[1], Expectation::PinLevel(_)));

    let resolved = scenario.resolve()?;
    assert_eq!(resolved.name, "timer3-blink");
    assert_eq!(resolved.program, Program::Timer3Irq);
    assert_eq!(resolved.core_hz, 8_000_000);
    assert_eq!(resolved.cycles, 16_000_000);
    assert_eq!(resolved.params.prescaler, Some(7999));
    assert_eq!(resolved.analog.get(&7), Some(&0x7FF));

    let pc13 = Pin::new(Port::C, 13);
    assert_eq!(
        resolved.checks,
        [
            Check::PinToggles {
                pin: pc13,
                toggles: 2
            },
            Check::PinLevel {
                pin: pc13,
                high: false
            },
            Check::VectorCount {
                exception: Exception::Irq(irq::TIM3),
                count: 2
            },
        ]
    );
    Ok(())
}

#[test]
fn test_minimal_scenario_takes_defaults() -> anyhow::Result<()> {
    let yaml = r#"
name: quick
program: blink
run:
  millis: 250
"#;
    let resolved = Scenario::from_yaml(yaml)?.resolve()?;
    assert_eq!(resolved.program, Program::Blink);
    assert_eq!(resolved.core_hz, 8_000_000);
    assert_eq!(resolved.cycles, 2_000_000);
    assert_eq!(resolved.pin, None);
    assert!(resolved.checks.is_empty());
    Ok(())
}

#[test]
fn test_for_program_runs_one_second() -> anyhow::Result<()> {
    let resolved = Scenario::for_program("systick_irq").resolve()?;
    assert_eq!(resolved.program, Program::SysTickIrq);
    assert_eq!(resolved.cycles, 8_000_000);
    Ok(())
}

#[test]
fn test_clock_source_and_pin_params() -> anyhow::Result<()> {
    let yaml = r#"
name: systick
program: systick-poll
clock: 72 MHz
run: { cycles: 1000 }
params:
  millis: 10
  clock_source: external
"#;
    let resolved = Scenario::from_yaml(yaml)?.resolve()?;
    assert_eq!(resolved.core_hz, 72_000_000);
    assert_eq!(resolved.clock_source, Some(ClockSource::External));

    let yaml = r#"
name: blink-pa5
program: blink
run: { cycles: 1000 }
params: { pin: PA5, off_iterations: 10, on_iterations: 10 }
"#;
    let resolved = Scenario::from_yaml(yaml)?.resolve()?;
    assert_eq!(resolved.pin, Some(Pin::new(Port::A, 5)));
    Ok(())
}

#[test]
fn test_unknown_fields_are_rejected() {
    let yaml = r#"
name: typo
program: blink
run: { cycles: 10 }
parms: { pin: PA5 }
"#;
    assert!(Scenario::from_yaml(yaml).is_err());

    let yaml = r#"
name: typo
program: blink
run: { cycles: 10 }
params: { led: PA5 }
"#;
    assert!(Scenario::from_yaml(yaml).is_err());
}

#[test]
fn test_unknown_expectation_shape_is_rejected() {
    let yaml = r#"
name: odd
program: blink
run: { cycles: 10 }
expect:
  - pin: PC13
    blinks: 3
"#;
    assert!(Scenario::from_yaml(yaml).is_err());
}

fn resolve_err(yaml: &str) -> ConfigError {
    Scenario::from_yaml(yaml)
        .expect("parses")
        .resolve()
        .expect_err("should not resolve")
}

#[test]
fn test_resolve_errors() {
    assert_eq!(
        resolve_err("{name: x, program: uart, run: {cycles: 1}}"),
        ConfigError::UnknownProgram("uart".into())
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, schema_version: '2.0', run: {cycles: 1}}"),
        ConfigError::UnsupportedSchema("2.0".into())
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, clock: 8GHz, run: {cycles: 1}}"),
        ConfigError::InvalidFrequency("8GHz".into())
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {cycles: 1, millis: 1}}"),
        ConfigError::InvalidRunLength
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {cycles: 0}}"),
        ConfigError::InvalidRunLength
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {}}"),
        ConfigError::InvalidRunLength
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {cycles: 1}, params: {pin: PZ3}}"),
        ConfigError::UnknownPin("PZ3".into())
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {cycles: 1}, analog: {18: 1}}"),
        ConfigError::InvalidChannel(18)
    );
    assert_eq!(
        resolve_err("{name: x, program: adc, run: {cycles: 1}, analog: {7: 0x1000}}"),
        ConfigError::AnalogOutOfRange {
            channel: 7,
            value: 0x1000
        }
    );
    assert_eq!(
        resolve_err("{name: x, program: blink, run: {cycles: 1}, expect: [{vector: USART1, count: 1}]}"),
        ConfigError::UnknownVector("USART1".into())
    );
}

#[test]
fn test_params_must_belong_to_program() {
    assert_eq!(
        resolve_err("{name: x, program: pwm, run: {cycles: 1}, params: {millis: 5}}"),
        ConfigError::UnusedParam {
            program: "pwm",
            param: "millis"
        }
    );
    assert!(matches!(
        resolve_err("{name: x, program: timer3-irq, run: {cycles: 1}, params: {reload: 70000}}"),
        ConfigError::ParamOutOfRange { param: "reload", .. }
    ));
    assert!(matches!(
        resolve_err("{name: x, program: systick-poll, run: {cycles: 1}, params: {millis: 0}}"),
        ConfigError::ParamOutOfRange { param: "millis", .. }
    ));
}

#[test]
fn test_polled_delays_need_a_usable_clock() {
    assert_eq!(
        resolve_err("{name: x, program: timer3-poll, clock: 1.5MHz, run: {cycles: 1}}"),
        ConfigError::UnsupportedClock {
            program: "timer3-poll",
            hz: 1_500_000,
            reason: "TIM3 needs a whole multiple of 1 MHz to count microseconds",
        }
    );
    assert!(matches!(
        resolve_err("{name: x, program: systick-poll, clock: 500Hz, run: {cycles: 1}}"),
        ConfigError::UnsupportedClock { hz: 500, .. }
    ));
    assert!(matches!(
        resolve_err(
            "{name: x, program: systick-poll, clock: 4kHz, run: {cycles: 1}, params: {clock_source: external}}"
        ),
        ConfigError::UnsupportedClock { hz: 4000, .. }
    ));

    let scenario =
        Scenario::from_yaml("{name: x, program: timer3-poll, clock: 72MHz, run: {cycles: 1}}")
            .expect("parses");
    assert!(scenario.resolve().is_ok());
}

#[test]
fn test_blink_odr_takes_blink_params() -> anyhow::Result<()> {
    let resolved = Scenario::from_yaml(
        "{name: x, program: blink-odr, run: {cycles: 1}, params: {pin: PB1, on_iterations: 5, off_iterations: 1}}",
    )?
    .resolve()?;
    assert_eq!(resolved.program, Program::BlinkOdr);
    assert_eq!(resolved.pin, Some(Pin::new(Port::B, 1)));
    assert_eq!(resolved.params.on_iterations, Some(5));

    assert!(matches!(
        resolve_err("{name: x, program: blink-odr, run: {cycles: 1}, params: {iterations: 5}}"),
        ConfigError::UnusedParam { program: "blink-odr", param: "iterations" }
    ));
    Ok(())
}

#[test]
fn test_from_file_reports_path() {
    let err = Scenario::from_file("/nonexistent/scenario.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/scenario.yaml"));
}
