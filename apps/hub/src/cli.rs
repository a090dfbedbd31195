use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "guardian-hub", version, about = "Coordinates uptime checks across connected validators")]
pub struct Cli {
    /// Path to the hub config file (defaults to ~/.config/guardian/hub.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the gateway, dispatcher and status server (default)
    Serve,

    /// Add a monitored target to the store
    AddTarget {
        url: String,
        #[arg(long, default_value = "cli")]
        owner: String,
    },

    /// Enable or disable an existing target
    SetEnabled {
        id: Uuid,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Print the effective configuration and exit
    ShowConfig,
}

impl Cli {
    pub fn action(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Serve)
    }
}
