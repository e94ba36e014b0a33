// Bridge diagnostic: READ-ONLY check of the motor/sensor bridge
//
// Pings the bridge and samples every sensor a few times. Never sends a
// power command, so the wheels stay still.
//
// Usage: cargo run --example bridge_diagnostic -- [port] [baud]
// Example: cargo run --example bridge_diagnostic -- /dev/ttyAMA0 115200

use raspbot_runtime::config::{BRIDGE_BAUDRATE, BRIDGE_PORT};
use raspbot_runtime::drive::bridge::BridgeLink;
use raspbot_runtime::messages::LINE_CHANNELS;
use std::thread::sleep;
use std::time::Duration;

const SAMPLES: usize = 10;
const LINE_NAMES: [&str; LINE_CHANNELS] = ["FL", "L", "M", "R", "FR"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| BRIDGE_PORT.to_string());
    let baud = match args.next() {
        Some(b) => b.parse()?,
        None => BRIDGE_BAUDRATE,
    };

    println!("Raspbot bridge diagnostic (read-only)");
    println!("Serial port: {} @ {}", port, baud);
    println!();

    println!("Step 1: Opening serial port...");
    let mut link = match BridgeLink::open(&port, baud) {
        Ok(link) => {
            println!("  ✓ Serial port opened");
            link
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Enable the UART (raspi-config) and disable the serial console");
            println!("  - Add your user to the dialout group");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging bridge...");
    match link.ping() {
        Ok(true) => println!("  ✓ RESPONDING"),
        Ok(false) => {
            println!("  ✗ NO RESPONSE (check bridge power and baud rate)");
            return Ok(());
        }
        Err(e) => {
            println!("  ✗ ERROR: {}", e);
            return Err(e.into());
        }
    }
    println!();

    println!("Step 3: Sampling sensors...");
    for i in 0..SAMPLES {
        let distance = match link.read_distance() {
            Ok(Some(cm)) => format!("{:6.1} cm", cm),
            Ok(None) => "  no echo".to_string(),
            Err(e) => format!("ERROR - {}", e),
        };
        let line = match link.read_line() {
            Ok(channels) => LINE_NAMES
                .iter()
                .zip(channels)
                .map(|(name, on)| if on { format!("[{}]", name) } else { format!(" {} ", name) })
                .collect::<String>(),
            Err(e) => format!("ERROR - {}", e),
        };
        let panic = match link.read_panic() {
            Ok(inputs) if inputs.iter().any(|&t| t) => format!("TRIGGERED {:?}", inputs),
            Ok(inputs) => format!("clear ({} inputs)", inputs.len()),
            Err(e) => format!("ERROR - {}", e),
        };
        println!("  #{:02} dist: {} | line: {} | panic: {}", i + 1, distance, line, panic);
        sleep(Duration::from_millis(200));
    }

    println!();
    println!("Diagnostic complete.");
    println!("Next step: run the runtime with --port {} and drive with the teleop demo", port);
    Ok(())
}
