// Link check: open the serial port, send one line, report whether it was acknowledged
//
// Usage: cargo run --example link_check -- --port /dev/ttyUSB0 "M115"
//
// The default command (M114, report position) does not move anything.

use clap::Parser;
use std::time::Duration;

use arm_zenoh_runtime::config::{ArmConfig, DEFAULT_BAUDRATE, DEFAULT_PORT};
use arm_zenoh_runtime::motor::{SerialOpener, Transport};

#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Line to send
    #[arg(default_value = "M114")]
    command: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = ArmConfig {
        port: args.port,
        baudrate: args.baud,
        response_timeout: Duration::from_millis(args.timeout_ms),
        ..ArmConfig::default()
    };

    println!("Serial port: {} @ {} baud", config.port, config.baudrate);
    let mut transport = Transport::new(Box::new(SerialOpener), &config);

    println!("Step 1: Opening serial port (waits for the board to reset)...");
    if let Err(e) = transport.try_connect() {
        println!("  ✗ {}", e);
        println!();
        println!("Troubleshooting:");
        println!("  - Check the port path is correct");
        println!("  - Verify the USB cable is connected");
        println!("  - On Linux, make sure you are in the dialout group");
        return Err(e.into());
    }
    println!("  ✓ Connected");

    println!("Step 2: Sending `{}`...", args.command);
    match transport.send_command(&args.command) {
        Ok(()) => println!("  ✓ Acknowledged"),
        Err(e) => println!("  ✗ {}", e),
    }

    transport.disconnect();
    Ok(())
}
