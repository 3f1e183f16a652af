//! wabridge - relays mobile chat messages into a Matrix room.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wabridge::{Bridge, BridgeConfig};

/// One-way notification bridge into Matrix
#[derive(Parser)]
#[command(name = "wabridge")]
#[command(about = "Relays mobile chat messages into a Matrix room")]
#[command(version)]
struct Args {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine; configuration may come from the environment.
    let dotenv = dotenvy::dotenv();

    setup_logging(&args.log_level, args.json_logs);

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config from environment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let bridge = match Bridge::build(&config).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to start bridge: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bridge.controller().run().await {
        error!("Bridge stopped: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Bridge stopped");
    ExitCode::SUCCESS
}
