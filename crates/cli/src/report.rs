// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use f1lab_config::Check;
use f1lab_sim::snapshot::BusStats;
use f1lab_sim::SystemBus;
use serde::Serialize;
use std::collections::BTreeMap;

pub const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinSummary {
    pub toggles: u64,
    pub high: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub result_schema_version: &'static str,
    pub scenario: String,
    pub program: String,
    pub status: Status,
    pub core_hz: u32,
    pub cycles: u64,
    pub elapsed_us: u64,
    pub polls: u64,
    pub pins: BTreeMap<String, PinSummary>,
    pub interrupts: BTreeMap<String, u64>,
    pub checks: Vec<CheckResult>,
    pub stats: BusStats,
    pub dropped_events: u64,
}

fn level_name(high: bool) -> &'static str {
    if high {
        "high"
    } else {
        "low"
    }
}

/// Compare one expectation against the bus at the end of a run.
pub fn evaluate(check: &Check, bus: &SystemBus) -> CheckResult {
    match *check {
        Check::PinToggles { pin, toggles } => {
            let actual = bus.trace().toggles(pin);
            CheckResult {
                check: format!("{} toggles", pin),
                expected: toggles.to_string(),
                actual: actual.to_string(),
                passed: actual == toggles,
            }
        }
        Check::PinLevel { pin, high } => {
            let actual = bus.pin_level(pin);
            CheckResult {
                check: format!("{} level", pin),
                expected: level_name(high).to_string(),
                actual: level_name(actual).to_string(),
                passed: actual == high,
            }
        }
        Check::VectorCount { exception, count } => {
            let actual = bus.interrupt_count(exception);
            CheckResult {
                check: format!("{} count", exception),
                expected: count.to_string(),
                actual: actual.to_string(),
                passed: actual == count,
            }
        }
    }
}

impl RunReport {
    pub fn collect(
        scenario: &str,
        program: &str,
        bus: &SystemBus,
        polls: u64,
        checks: Vec<CheckResult>,
    ) -> Self {
        let trace = bus.trace();
        let pins = trace
            .toggled_pins()
            .map(|(pin, toggles)| {
                let summary = PinSummary {
                    toggles,
                    high: bus.pin_level(pin),
                };
                (pin.to_string(), summary)
            })
            .collect();

        let status = if checks.iter().all(|c| c.passed) {
            Status::Pass
        } else {
            Status::Fail
        };

        Self {
            result_schema_version: RESULT_SCHEMA_VERSION,
            scenario: scenario.to_string(),
            program: program.to_string(),
            status,
            core_hz: bus.core_hz(),
            cycles: bus.cycles(),
            elapsed_us: bus.elapsed_micros(),
            polls,
            pins,
            interrupts: bus.snapshot().interrupts,
            checks,
            stats: bus.stats(),
            dropped_events: trace.dropped(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn log(&self) {
        tracing::info!(
            "{} ({}): {} cycles, {} us simulated, {} loop passes",
            self.scenario,
            self.program,
            self.cycles,
            self.elapsed_us,
            self.polls
        );
        for (pin, summary) in &self.pins {
            tracing::info!(
                "  {}: {} toggles, ends {}",
                pin,
                summary.toggles,
                level_name(summary.high)
            );
        }
        for (name, count) in &self.interrupts {
            tracing::info!("  {}: {} handler runs", name, count);
        }
        if self.stats != BusStats::default() {
            tracing::warn!("Bus absorbed accesses: {:?}", self.stats);
        }
        if self.dropped_events > 0 {
            tracing::warn!("Trace full: {} events dropped", self.dropped_events);
        }
        for check in &self.checks {
            if check.passed {
                tracing::info!("  PASS {} = {}", check.check, check.actual);
            } else {
                tracing::error!(
                    "  FAIL {}: expected {}, got {}",
                    check.check,
                    check.expected,
                    check.actual
                );
            }
        }
    }
}
