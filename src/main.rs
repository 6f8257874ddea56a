use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use mecanum_odometry_runtime::config::{LOOP_HZ, MAX_LOOP_HZ};
use mecanum_odometry_runtime::runtime::{self, RunOptions, TelemetryFormat};

/// Run the autonomous collect-and-shoot routine on the simulated base
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control loop frequency
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ))]
    cycle_hz: u64,

    /// Telemetry output
    #[arg(long, value_enum, default_value_t = Telemetry::Log)]
    telemetry: Telemetry,

    /// Simulated seconds per wall-clock second
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Telemetry {
    Log,
    Json,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !(args.time_scale.is_finite() && args.time_scale > 0.0) {
        eprintln!("--time-scale must be positive");
        std::process::exit(2);
    }

    let options = RunOptions {
        config: args.config,
        cycle_hz: args.cycle_hz,
        telemetry: match args.telemetry {
            Telemetry::Log => TelemetryFormat::Log,
            Telemetry::Json => TelemetryFormat::Json,
        },
        time_scale: args.time_scale,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
