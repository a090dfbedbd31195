//! guardian-hub - coordination core for distributed uptime checks
//!
//! Validators hold a WebSocket open to the hub. Every dispatch round the hub
//! sends each of them one `ping` per enabled target, correlates the `validate`
//! replies back to the task that produced them and stores one tick per reply.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod routes;
pub mod stats;
pub mod store;

pub use app::Hub;
pub use error::HubError;
