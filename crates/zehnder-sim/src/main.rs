use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zehnder_sim::{InMemoryRecorder, Scenario, SimResult, Simulation};

/// Run a Zehnder fan network scenario against the simulated nRF905.
#[derive(Parser, Debug)]
#[command(name = "zehnder-sim", version, about, long_about = None)]
struct Args {
    /// Scenario file (YAML)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let recorder = Arc::new(InMemoryRecorder::new());
    if metrics::set_global_recorder(Arc::clone(&recorder)).is_ok() {
        zehnder_rf::metrics::describe_metrics();
    } else {
        warn!("Metrics recorder already installed, counters not reported");
    }

    match run(&args, &recorder) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, recorder: &InMemoryRecorder) -> SimResult<()> {
    let mut scenario = Scenario::load(&args.scenario)?;
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    info!(
        "Running '{}' for {} ms (seed {})",
        scenario.name, scenario.duration_ms, scenario.seed
    );

    let mut sim = Simulation::new(&scenario)?;
    sim.engine().dump_config();
    let mut report = sim.run(&scenario)?;
    report.metrics = recorder.counters();

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode report: {}", e),
        }
    } else {
        for timed in &report.outcomes {
            println!("{:>8} ms  {:?}", timed.at_ms, timed.outcome);
        }
        println!(
            "air: {} controller / {} main unit copies, {} lost, {} missed",
            report.air.controller_frames,
            report.air.main_unit_frames,
            report.air.lost,
            report.air.missed
        );
        println!(
            "fan: {:?} at {}%, timer {} min",
            report.fan.speed, report.fan.voltage, report.fan.timer
        );
        for (name, value) in &report.metrics {
            println!("{}: {}", name, value);
        }
    }

    report.check(&scenario.expect)
}
