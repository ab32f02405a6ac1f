// F1Lab - STM32F103 Peripheral Patterns
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod report;
mod vcd_trace;

use anyhow::Context;
use clap::{Parser, Subcommand};
use f1lab_config::{ResolvedScenario, RunLimits, Scenario};
use f1lab_hal::app::{
    board, AdcThreshold, Blink, BlinkOdr, BlinkXor, Pwm, SysTickIrq, SysTickPoll, Timer3Irq,
    Timer3Poll,
};
use f1lab_hal::systick::ClockSource;
use f1lab_hal::timing::{BusyWait, TimerConfig};
use f1lab_hal::{App, Program};
use f1lab_sim::{Machine, SystemBus};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use report::{evaluate, RunReport};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Simulated seconds a run may overshoot its length before the watchdog
/// aborts it.
const WATCHDOG_SLACK_SECONDS: u64 = 4;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "F1Lab: STM32F103 peripheral patterns on a cycle-stepped simulator",
    long_about = None
)]
struct Cli {
    /// Log register traffic and dispatch decisions (DEBUG level)
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario file, or a program with its built-in parameters.
    Run(RunArgs),

    /// List the programs.
    List,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the scenario (YAML)
    #[arg(required_unless_present = "program")]
    scenario: Option<PathBuf>,

    /// Program to run without a scenario file
    #[arg(short, long, conflicts_with = "scenario")]
    program: Option<String>,

    /// Core clock, e.g. 8MHz (overrides the scenario)
    #[arg(long)]
    clock: Option<String>,

    /// Run length in core cycles (overrides the scenario)
    #[arg(long, conflicts_with = "millis")]
    cycles: Option<u64>,

    /// Run length in simulated milliseconds (overrides the scenario)
    #[arg(long)]
    millis: Option<u64>,

    /// Abort with a runtime error once the run reaches this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Write the bus snapshot (JSON) at the end of the run
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the pin transitions as a VCD waveform
    #[arg(long)]
    vcd: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine readable.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::List => {
            for program in Program::ALL {
                println!("{:<14} {}", program.name(), program.summary());
            }
            ExitCode::from(EXIT_PASS)
        }
    }
}

fn load_scenario(args: &RunArgs) -> anyhow::Result<ResolvedScenario> {
    let mut scenario = match (&args.scenario, &args.program) {
        (Some(path), _) => Scenario::from_file(path)?,
        (None, Some(program)) => Scenario::for_program(program),
        (None, None) => anyhow::bail!("either a scenario file or --program is required"),
    };

    if let Some(clock) = &args.clock {
        scenario.clock = clock.clone();
    }
    if args.cycles.is_some() || args.millis.is_some() {
        scenario.run = RunLimits {
            cycles: args.cycles,
            millis: args.millis,
        };
    }

    let resolved = scenario.resolve()?;
    if let Some(max) = args.max_cycles {
        if max < resolved.cycles {
            anyhow::bail!(
                "--max-cycles {} is below the run length of {} cycles",
                max,
                resolved.cycles
            );
        }
    }
    Ok(resolved)
}

/// The program with the scenario's parameters over its built-in ones.
fn build_app(scenario: &ResolvedScenario) -> Box<dyn App<SystemBus>> {
    let params = &scenario.params;
    let core_hz = scenario.core_hz;
    let pin = scenario.pin.unwrap_or(board::LED.0);

    match scenario.program {
        Program::Blink => {
            let mut app = Blink::new(pin);
            if let Some(n) = params.off_iterations {
                app.off = BusyWait::new(n);
            }
            if let Some(n) = params.on_iterations {
                app.on = BusyWait::new(n);
            }
            Box::new(app)
        }
        Program::BlinkXor => {
            let mut app = BlinkXor::new(pin);
            if let Some(n) = params.iterations {
                app.delay = BusyWait::new(n);
            }
            Box::new(app)
        }
        Program::BlinkOdr => {
            let mut app = BlinkOdr::new(pin);
            if let Some(n) = params.off_iterations {
                app.off = BusyWait::new(n);
            }
            if let Some(n) = params.on_iterations {
                app.on = BusyWait::new(n);
            }
            Box::new(app)
        }
        Program::SysTickPoll => Box::new(SysTickPoll::new(
            scenario.clock_source.unwrap_or(ClockSource::Processor),
            core_hz,
            params.millis.unwrap_or(SysTickPoll::MILLIS),
        )),
        Program::SysTickIrq => Box::new(SysTickIrq::new(
            scenario.clock_source.unwrap_or(ClockSource::External),
            params.reload.unwrap_or(SysTickIrq::RELOAD),
        )),
        Program::Timer3Poll => Box::new(Timer3Poll::new(
            core_hz,
            params.millis.unwrap_or(Timer3Poll::MILLIS),
        )),
        Program::Timer3Irq => Box::new(Timer3Irq::new(TimerConfig::new(
            core_hz,
            timer_field(params.prescaler, Timer3Irq::PRESCALER),
            timer_field(params.reload, Timer3Irq::RELOAD),
            true,
        ))),
        Program::Pwm => Box::new(Pwm::new(
            TimerConfig::new(
                core_hz,
                timer_field(params.prescaler, Pwm::PRESCALER),
                timer_field(params.reload, Pwm::RELOAD),
                false,
            ),
            timer_field(params.compare, Pwm::COMPARE),
        )),
        Program::Adc => Box::new(AdcThreshold::new(
            params
                .threshold
                .map(|t| t.min(u16::MAX as u32) as u16)
                .unwrap_or(board::ADC_THRESHOLD),
        )),
    }
}

/// Timer registers are 16 bits wide; scenario values are range checked.
fn timer_field(value: Option<u32>, default: u16) -> u16 {
    value.map(|v| v.min(u16::MAX as u32) as u16).unwrap_or(default)
}

fn run(args: RunArgs) -> ExitCode {
    let scenario = match load_scenario(&args) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match simulate(&args, &scenario) {
        Ok(report) if report.passed() => ExitCode::from(EXIT_PASS),
        Ok(_) => ExitCode::from(EXIT_ASSERT_FAIL),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn simulate(args: &RunArgs, scenario: &ResolvedScenario) -> anyhow::Result<RunReport> {
    let mut bus = SystemBus::new(scenario.core_hz)?;
    for (&channel, &value) in &scenario.analog {
        bus.set_analog_input(channel, value)?;
    }

    let limit = args.max_cycles.unwrap_or_else(|| {
        scenario
            .cycles
            .saturating_add(WATCHDOG_SLACK_SECONDS * scenario.core_hz as u64)
    });
    bus.set_watchdog(limit, |cycle| {
        error!("Watchdog: run still going at cycle {}", cycle);
        std::process::exit(EXIT_RUNTIME_ERROR as i32);
    });

    info!(
        "Running '{}': {} at {} Hz for {} cycles",
        scenario.name, scenario.program, scenario.core_hz, scenario.cycles
    );
    let mut machine = Machine::new(bus, build_app(scenario));
    machine.run_for(scenario.cycles);

    let checks = scenario
        .checks
        .iter()
        .map(|check| evaluate(check, &machine.bus))
        .collect();
    let report = RunReport::collect(
        &scenario.name,
        scenario.program.name(),
        &machine.bus,
        machine.polls(),
        checks,
    );

    if let Some(path) = &args.snapshot {
        let json = serde_json::to_string_pretty(&machine.bus.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        info!("Snapshot written to {:?}", path);
    }

    if let Some(path) = &args.vcd {
        let file = File::create(path)
            .with_context(|| format!("Failed to create VCD file {:?}", path))?;
        vcd_trace::write_pins(
            BufWriter::new(file),
            machine.bus.trace(),
            scenario.core_hz,
            machine.bus.cycles(),
        )?;
        info!("Waveform written to {:?}", path);
    }

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        report.log();
    }
    Ok(report)
}
