use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spencer_runtime::config::{BIND_ADDR, I2C_BUS};
use spencer_runtime::runtime::{self, RuntimeOptions};

/// Stair-climbing runtime for Spencer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// I2C device the motor and sensor boards are on
    #[arg(long, default_value = I2C_BUS)]
    i2c: String,

    /// Address of the command server
    #[arg(long, default_value = BIND_ADDR)]
    bind: String,

    /// JSON calibration file overriding the built-in thresholds
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Use an in-memory bus instead of the hardware
    #[arg(long)]
    dry_run: bool,

    /// Publish sensors and progress over zenoh
    #[arg(long)]
    telemetry: bool,

    /// Do not zero the lift encoders at startup
    #[arg(long)]
    skip_zero: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RuntimeOptions {
        i2c: args.i2c,
        bind: args.bind,
        calibration: args.calibration,
        dry_run: args.dry_run,
        telemetry: args.telemetry,
        skip_zero: args.skip_zero,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
