#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use guardian_proto::crypto::load_or_generate_keypair;
use guardian_validator::monitoring::MonitoringExecutor;
use guardian_validator::{LoadedConfig, ValidatorAgent, ValidatorConfig};
use logger::init_tracing;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "guardian-validator", version, about = "Runs uptime checks for a guardian hub")]
struct Cli {
    /// Path to the validator config file (defaults to ~/.config/guardian/validator.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the hub WebSocket URL
    #[arg(long)]
    hub: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let LoadedConfig { mut config, path } = ValidatorConfig::from_config(cli.config.as_ref())?;
    config.apply_env()?;
    if let Some(hub) = cli.hub {
        config.hub.url = hub;
    }

    if cli.show_config {
        println!("{config}");
        return Ok(());
    }

    let keypair_path = config.keypair_path(&path);
    let keypair = load_or_generate_keypair(&keypair_path)
        .with_context(|| format!("Failed to load keypair from {}", keypair_path.display()))?;
    info!("Using identity {} from {}", keypair.public_key(), keypair_path.display());

    let executor = MonitoringExecutor::new(
        config.checks.timeout(),
        config.checks.degraded_threshold_ms,
        config.checks.allow_private_targets,
    )?;

    let agent = ValidatorAgent::new(config, keypair, Arc::new(executor));

    tokio::select! {
        () = agent.run() => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
