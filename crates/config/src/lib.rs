// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use f1lab_hal::gpio::Pin;
use f1lab_hal::systick::{ClockSource, RELOAD_MAX};
use f1lab_hal::timing::{SysTickDelay, TimerDelay};
use f1lab_hal::vector::Exception;
use f1lab_hal::Program;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Analog inputs of ADC1: sixteen pins, temperature sensor, VREFINT.
pub const ADC_CHANNELS: u8 = 18;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_clock() -> String {
    "8MHz".to_string()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported schema_version '{0}', supported: '1.0'")]
    UnsupportedSchema(String),
    #[error("invalid frequency '{0}' (expected a positive number with Hz, kHz or MHz)")]
    InvalidFrequency(String),
    #[error("unknown program '{0}'")]
    UnknownProgram(String),
    #[error("unknown pin '{0}' (expected a name like PC13)")]
    UnknownPin(String),
    #[error("unknown vector '{0}' (expected a name like TIM3, SysTick or IRQ29)")]
    UnknownVector(String),
    #[error("ADC channel {0} does not exist (0..=17)")]
    InvalidChannel(u8),
    #[error("analog value {value:#x} on channel {channel} exceeds 12 bits")]
    AnalogOutOfRange { channel: u8, value: u16 },
    #[error("run length must be given as exactly one of 'cycles' or 'millis', and be non-zero")]
    InvalidRunLength,
    #[error("parameter '{param}' does not apply to program '{program}'")]
    UnusedParam { program: &'static str, param: &'static str },
    #[error("program '{program}' cannot run at {hz} Hz: {reason}")]
    UnsupportedClock {
        program: &'static str,
        hz: u32,
        reason: &'static str,
    },
    #[error("parameter '{param}' = {value} is out of range ({range})")]
    ParamOutOfRange {
        param: &'static str,
        value: u64,
        range: &'static str,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunLimits {
    #[serde(default)]
    pub cycles: Option<u64>,
    #[serde(default)]
    pub millis: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClockSourceName {
    Processor,
    External,
}

impl From<ClockSourceName> for ClockSource {
    fn from(name: ClockSourceName) -> Self {
        match name {
            ClockSourceName::Processor => ClockSource::Processor,
            ClockSourceName::External => ClockSource::External,
        }
    }
}

/// Program parameters. Each program reads only its own; unset ones take the
/// program's built-in value.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// LED pin of the `blink` programs.
    #[serde(default)]
    pub pin: Option<String>,
    /// `blink` and `blink-odr` busy-wait with the LED off.
    #[serde(default)]
    pub off_iterations: Option<u32>,
    /// `blink` and `blink-odr` busy-wait with the LED on.
    #[serde(default)]
    pub on_iterations: Option<u32>,
    /// `blink-xor` busy-wait between toggles.
    #[serde(default)]
    pub iterations: Option<u32>,
    /// Toggle interval of the polled delays.
    #[serde(default)]
    pub millis: Option<u32>,
    #[serde(default)]
    pub clock_source: Option<ClockSourceName>,
    #[serde(default)]
    pub prescaler: Option<u32>,
    #[serde(default)]
    pub reload: Option<u32>,
    /// PWM compare value (CCR4).
    #[serde(default)]
    pub compare: Option<u32>,
    /// ADC level below which the LED is on.
    #[serde(default)]
    pub threshold: Option<u32>,
}

impl Params {
    /// Names of the parameters that are set.
    fn set(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            ("pin", self.pin.is_some()),
            ("off_iterations", self.off_iterations.is_some()),
            ("on_iterations", self.on_iterations.is_some()),
            ("iterations", self.iterations.is_some()),
            ("millis", self.millis.is_some()),
            ("clock_source", self.clock_source.is_some()),
            ("prescaler", self.prescaler.is_some()),
            ("reload", self.reload.is_some()),
            ("compare", self.compare.is_some()),
            ("threshold", self.threshold.is_some()),
        ]
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| name)
    }
}

/// Parameters each program reads.
pub fn accepted_params(program: Program) -> &'static [&'static str] {
    match program {
        Program::Blink => &["pin", "off_iterations", "on_iterations"],
        Program::BlinkXor => &["pin", "iterations"],
        Program::BlinkOdr => &["pin", "off_iterations", "on_iterations"],
        Program::SysTickPoll => &["millis", "clock_source"],
        Program::SysTickIrq => &["reload", "clock_source"],
        Program::Timer3Poll => &["millis"],
        Program::Timer3Irq => &["prescaler", "reload"],
        Program::Pwm => &["prescaler", "reload", "compare"],
        Program::Adc => &["threshold"],
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Low,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinTogglesExpectation {
    pub pin: String,
    pub toggles: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinLevelExpectation {
    pub pin: String,
    pub level: Level,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VectorCountExpectation {
    pub vector: String,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Expectation {
    PinToggles(PinTogglesExpectation),
    PinLevel(PinLevelExpectation),
    VectorCount(VectorCountExpectation),
}

/// An expectation with its names resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    PinToggles { pin: Pin, toggles: u64 },
    PinLevel { pin: Pin, high: bool },
    VectorCount { exception: Exception, count: u64 },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub program: String,
    #[serde(default = "default_clock")]
    pub clock: String,
    pub run: RunLimits,
    #[serde(default)]
    pub params: Params,
    /// ADC channel to 12-bit input level.
    #[serde(default)]
    pub analog: BTreeMap<u8, u16>,
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

/// A validated scenario, ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedScenario {
    pub name: String,
    pub program: Program,
    pub core_hz: u32,
    pub cycles: u64,
    pub params: Params,
    pub pin: Option<Pin>,
    pub clock_source: Option<ClockSource>,
    pub analog: BTreeMap<u8, u16>,
    pub checks: Vec<Check>,
}

impl Scenario {
    /// Default run length when none is given.
    pub const DEFAULT_MILLIS: u64 = 1000;

    /// A scenario running `program` with its built-in parameters for one
    /// simulated second and no expectations.
    pub fn for_program(program: &str) -> Self {
        Self {
            schema_version: default_schema_version(),
            name: program.to_string(),
            program: program.to_string(),
            clock: default_clock(),
            run: RunLimits {
                cycles: None,
                millis: Some(Self::DEFAULT_MILLIS),
            },
            params: Params::default(),
            analog: BTreeMap::new(),
            expect: Vec::new(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid scenario {:?}", path.as_ref()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(yaml).context("Failed to parse scenario YAML")?;
        tracing::debug!("Loaded scenario '{}' ({})", scenario.name, scenario.program);
        Ok(scenario)
    }

    /// Check every name, number and unit; convert to typed values.
    pub fn resolve(&self) -> Result<ResolvedScenario, ConfigError> {
        if self.schema_version.trim() != SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }

        let program: Program = self
            .program
            .parse()
            .map_err(|_| ConfigError::UnknownProgram(self.program.clone()))?;
        let core_hz = parse_frequency(&self.clock)?;

        let cycles = match (self.run.cycles, self.run.millis) {
            (Some(cycles), None) if cycles > 0 => cycles,
            (None, Some(millis)) if millis > 0 => millis.saturating_mul(core_hz as u64) / 1000,
            _ => return Err(ConfigError::InvalidRunLength),
        };
        if cycles == 0 {
            return Err(ConfigError::InvalidRunLength);
        }

        let accepted = accepted_params(program);
        if let Some(param) = self.params.set().find(|p| !accepted.contains(p)) {
            return Err(ConfigError::UnusedParam {
                program: program.name(),
                param,
            });
        }
        check_params(program, &self.params)?;
        check_clock(program, core_hz, &self.params)?;

        let pin = self.params.pin.as_deref().map(parse_pin).transpose()?;

        for (&channel, &value) in &self.analog {
            if channel >= ADC_CHANNELS {
                return Err(ConfigError::InvalidChannel(channel));
            }
            if value > f1lab_hal::adc::MAX_SAMPLE {
                return Err(ConfigError::AnalogOutOfRange { channel, value });
            }
        }

        let checks = self
            .expect
            .iter()
            .map(Expectation::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedScenario {
            name: self.name.clone(),
            program,
            core_hz,
            cycles,
            params: self.params.clone(),
            pin,
            clock_source: self.params.clock_source.map(ClockSource::from),
            analog: self.analog.clone(),
            checks,
        })
    }
}

impl Expectation {
    pub fn resolve(&self) -> Result<Check, ConfigError> {
        Ok(match self {
            Expectation::PinToggles(e) => Check::PinToggles {
                pin: parse_pin(&e.pin)?,
                toggles: e.toggles,
            },
            Expectation::PinLevel(e) => Check::PinLevel {
                pin: parse_pin(&e.pin)?,
                high: e.level == Level::High,
            },
            Expectation::VectorCount(e) => Check::VectorCount {
                exception: e
                    .vector
                    .parse()
                    .map_err(|_| ConfigError::UnknownVector(e.vector.clone()))?,
                count: e.count,
            },
        })
    }
}

fn check_range(
    param: &'static str,
    value: Option<u32>,
    max: u32,
    range: &'static str,
) -> Result<(), ConfigError> {
    match value {
        Some(v) if v > max => Err(ConfigError::ParamOutOfRange {
            param,
            value: v as u64,
            range,
        }),
        _ => Ok(()),
    }
}

fn check_params(program: Program, params: &Params) -> Result<(), ConfigError> {
    check_range("prescaler", params.prescaler, 0xFFFF, "0..=65535")?;
    check_range("compare", params.compare, 0xFFFF, "0..=65535")?;
    check_range("threshold", params.threshold, 0x1000, "0..=4096")?;
    match program {
        Program::SysTickIrq => check_range("reload", params.reload, RELOAD_MAX, "0..=0xFFFFFF")?,
        _ => check_range("reload", params.reload, 0xFFFF, "0..=65535")?,
    }
    if params.millis == Some(0) {
        return Err(ConfigError::ParamOutOfRange {
            param: "millis",
            value: 0,
            range: "at least 1",
        });
    }
    Ok(())
}

/// The polled delays derive their millisecond from the core clock.
fn check_clock(program: Program, core_hz: u32, params: &Params) -> Result<(), ConfigError> {
    let reason = match program {
        Program::SysTickPoll => {
            let source = params
                .clock_source
                .map(ClockSource::from)
                .unwrap_or(ClockSource::Processor);
            (!SysTickDelay::supports_clock(source, core_hz))
                .then_some("SysTick needs at least 1 kHz on its clock source")
        }
        Program::Timer3Poll => (!TimerDelay::supports_clock(core_hz))
            .then_some("TIM3 needs a whole multiple of 1 MHz to count microseconds"),
        _ => None,
    };
    match reason {
        Some(reason) => Err(ConfigError::UnsupportedClock {
            program: program.name(),
            hz: core_hz,
            reason,
        }),
        None => Ok(()),
    }
}

pub fn parse_pin(name: &str) -> Result<Pin, ConfigError> {
    name.parse()
        .map_err(|_| ConfigError::UnknownPin(name.to_string()))
}

/// Parse `8MHz`, `72 MHz`, `500kHz`, `32768Hz` or a bare number of Hz.
pub fn parse_frequency(s: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidFrequency(s.to_string());
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "hz" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        _ => return Err(invalid()),
    };
    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    let hz = value * scale;
    if !hz.is_finite() || hz < 1.0 || hz > u32::MAX as f64 || hz.fract() != 0.0 {
        return Err(invalid());
    }
    Ok(hz as u32)
}
