use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use arm_zenoh_runtime::config::{
    validate_feedrate, ArmConfig, DEFAULT_BAUDRATE, DEFAULT_FEEDRATE, DEFAULT_PORT,
    DEFAULT_RESPONSE_TIMEOUT,
};

/// Four-axis arm runtime: pose requests over Zenoh, G-code moves over serial
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the firmware board
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    /// Move speed sent with every G1 (1000..=500000)
    #[arg(long, default_value_t = DEFAULT_FEEDRATE)]
    feedrate: u32,

    /// How long to wait for "ok" after each line
    #[arg(long, default_value_t = DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Run without touching the serial port
    #[arg(long)]
    disable_hardware: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let feedrate = match validate_feedrate(args.feedrate) {
        Ok(feedrate) => feedrate,
        Err(e) => {
            eprintln!("Invalid arguments: {}", e);
            std::process::exit(2);
        }
    };

    let config = ArmConfig {
        port: args.port,
        baudrate: args.baud,
        response_timeout: Duration::from_millis(args.timeout_ms),
        feedrate,
        hardware_enabled: !args.disable_hardware,
        ..ArmConfig::default()
    };

    if let Err(e) = arm_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
