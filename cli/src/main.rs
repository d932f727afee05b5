use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use clap::ArgAction::{Set, SetTrue};
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use asic::{Asic, ConfigError, MachineDescription, ModuleRegistry, RunError, Runner};
use cpu::Cpu;

/// Simulator for machines assembled from modular CPU and bus
/// components
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// JSON file describing the machine to simulate.
    #[clap(action = Set)]
    machine: PathBuf,

    /// Give up if the machine has not halted after this many
    /// milliseconds.
    #[clap(action = Set, long)]
    deadline_ms: Option<u64>,

    /// Print the contents of every register file once the machine
    /// has halted.
    #[clap(action = SetTrue, long)]
    dump_registers: bool,
}

#[derive(Debug)]
enum Fail {
    /// The machine description could not be turned into a machine.
    Config(ConfigError),
    /// The machine was built but did not run to completion.
    Run(RunError),
    /// We were not able to correctly initialise the simulator.
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Config(e) => e.fmt(f),
            Fail::Run(e) => e.fmt(f),
            Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

fn dump_registers(cpu: &Cpu) {
    let bank = cpu.bank();
    for file in 0..bank.file_count() {
        let name = bank.file_name(file).unwrap_or_default();
        let Some(values) = bank.snapshot(file) else {
            continue;
        };
        println!("{} register file {}:", cpu.name(), name);
        for (row, chunk) in values.chunks(4).enumerate() {
            let line: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(col, value)| format!("{name}{:<3}{value:#010x}", row * 4 + col))
                .collect();
            println!("  {}", line.join("  "));
        }
    }
}

fn run_simulator() -> Result<(), Fail> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Fail::InitialisationFailure(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {e}"
            )));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let span = span!(Level::ERROR, "simulate", machine=?cli.machine);
    let _enter = span.enter();

    let desc = MachineDescription::from_file(&cli.machine).map_err(Fail::Config)?;
    let mut asic =
        Asic::build(&desc, &ModuleRegistry::with_builtin_modules()).map_err(Fail::Config)?;
    let mut runner = Runner::new();
    if let Some(ms) = cli.deadline_ms {
        runner = runner.with_deadline(Duration::from_millis(ms));
    }
    let result = runner.run(&mut asic).map_err(Fail::Run);
    match &result {
        Err(e) => event!(Level::ERROR, "simulation failed: {}", e),
        Ok(report) => event!(
            Level::INFO,
            "simulation completed in {:?}",
            report.elapsed
        ),
    }
    if cli.dump_registers {
        asic.cpus().iter().for_each(dump_registers);
    }
    result.map(|_| ())
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
