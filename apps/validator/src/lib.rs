//! guardian-validator - agent that performs uptime checks on behalf of a hub

pub mod agent;
pub mod config;
pub mod monitoring;

pub use agent::ValidatorAgent;
pub use config::{LoadedConfig, ValidatorConfig};
