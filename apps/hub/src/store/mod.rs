//! Storage collaborators of the coordination core
//!
//! The hub only ever talks to storage through the narrow traits below:
//! - `TargetSource` is polled once per dispatch round
//! - `IdentityStore` maps a validator public key to its durable record
//! - `ResultSink` persists one tick per resolved task
//! - `TickReader` and `TargetAdmin` serve the status surface and the CLI
//!
//! Two backends implement all of them: an in-process `MemoryStore` and a
//! libsql-backed `LibsqlStore`.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pool;

pub use database::LibsqlStore;
pub use memory::MemoryStore;
pub use models::{MonitoredTarget, NewTick, Tick, ValidatorRecord};

use anyhow::Result;
use async_trait::async_trait;
use guardian_proto::PublicKey;
use uuid::Uuid;

/// Source of targets to fan out each round
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// All targets whose enabled flag is set
    async fn list_enabled(&self) -> Result<Vec<MonitoredTarget>>;
}

/// Durable validator identities
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Return the record for `public_key`, creating it on first sight.
    /// Address and location are refreshed on every call.
    async fn upsert(&self, public_key: &PublicKey, ip: &str, location: &str)
    -> Result<ValidatorRecord>;
}

/// Persistence for check results
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, tick: NewTick) -> Result<Tick>;
}

/// Read side of the result history
#[async_trait]
pub trait TickReader: Send + Sync {
    /// Up to `limit` ticks for a target, newest first
    async fn recent_ticks(&self, target_id: Uuid, limit: usize) -> Result<Vec<Tick>>;
}

/// Target management used by the CLI and config seeding
#[async_trait]
pub trait TargetAdmin: Send + Sync {
    async fn add_target(&self, url: &str, owner: &str) -> Result<MonitoredTarget>;

    async fn find_target_by_url(&self, url: &str) -> Result<Option<MonitoredTarget>>;

    /// Returns false when no target has this id
    async fn set_enabled(&self, target_id: Uuid, enabled: bool) -> Result<bool>;
}

/// Everything the hub binary needs from one backend
pub trait Store: TargetSource + IdentityStore + ResultSink + TickReader + TargetAdmin {}

impl<T> Store for T where T: TargetSource + IdentityStore + ResultSink + TickReader + TargetAdmin {}

/// Reject target URLs that a validator could never check.
pub fn validate_target_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid URL {raw}: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("Unsupported URL scheme: {other}"),
    }

    if url.host_str().is_none() {
        anyhow::bail!("URL has no host: {raw}");
    }

    Ok(url)
}

/// Insert each seed target that is not stored yet.
pub async fn seed_targets<S: TargetAdmin + ?Sized>(
    store: &S,
    seeds: &[crate::config::SeedTarget],
) -> Result<usize> {
    let mut inserted = 0;

    for seed in seeds {
        if store.find_target_by_url(&seed.url).await?.is_some() {
            continue;
        }
        store.add_target(&seed.url, &seed.owner).await?;
        inserted += 1;
    }

    Ok(inserted)
}
