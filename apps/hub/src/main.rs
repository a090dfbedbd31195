#![warn(clippy::all, clippy::pedantic)]

use clap::Parser;
use guardian_hub::HubError;
use guardian_hub::app::{open_admin_store, serve};
use guardian_hub::cli::{Cli, Commands};
use guardian_hub::config::HubConfig;
use guardian_hub::store::TargetAdmin;
use logger::init_tracing;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), HubError> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = HubConfig::from_config(cli.config.as_ref())?;
    config.apply_env()?;

    match cli.action() {
        Commands::Serve => serve(config).await,
        Commands::ShowConfig => {
            println!("{config}");
            Ok(())
        }
        Commands::AddTarget { url, owner } => {
            let store = open_admin_store(&config).await?;
            let target = store.add_target(url, owner).await?;
            info!("Added target {} ({})", target.id, target.url);
            println!("{}", target.id);
            Ok(())
        }
        Commands::SetEnabled { id, enabled } => {
            let store = open_admin_store(&config).await?;
            if !store.set_enabled(*id, *enabled).await? {
                return Err(anyhow::anyhow!("no target with id {id}").into());
            }
            info!("Target {} enabled = {}", id, enabled);
            Ok(())
        }
    }
}
