use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use raspbot_runtime::config::BRIDGE_BAUDRATE;
use raspbot_runtime::runtime::RuntimeOptions;

/// Drive and safety runtime for the Raspbot base
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON tuning file (missing file = defaults)
    #[arg(long, default_value = "raspbot.json")]
    config: PathBuf,

    /// Serial device of the motor/sensor bridge. Without it the robot runs in simulation.
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = BRIDGE_BAUDRATE)]
    baud: u32,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let options = RuntimeOptions {
        config_path: cli.config,
        port: cli.port,
        baudrate: cli.baud,
    };

    if let Err(e) = raspbot_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
