//! Process-local store. Used by the `memory` backend and by tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use guardian_proto::PublicKey;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{MonitoredTarget, NewTick, Tick, ValidatorRecord};
use super::{IdentityStore, ResultSink, TargetAdmin, TargetSource, TickReader};

#[derive(Default)]
struct Inner {
    validators: HashMap<PublicKey, ValidatorRecord>,
    targets: Vec<MonitoredTarget>,
    /// Per-target history in insertion (oldest-first) order
    ticks: HashMap<Uuid, Vec<Tick>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with targets
    pub fn with_targets(targets: Vec<MonitoredTarget>) -> Self {
        Self { inner: RwLock::new(Inner { targets, ..Default::default() }) }
    }

    /// Total ticks recorded across all targets
    pub async fn tick_count(&self) -> usize {
        self.inner.read().await.ticks.values().map(Vec::len).sum()
    }

    pub async fn validator(&self, public_key: &PublicKey) -> Option<ValidatorRecord> {
        self.inner.read().await.validators.get(public_key).cloned()
    }

    /// Drop a target and its history, as the CRUD side would on delete
    pub async fn remove_target(&self, target_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.targets.retain(|t| t.id != target_id);
        inner.ticks.remove(&target_id);
    }
}

#[async_trait]
impl TargetSource for MemoryStore {
    async fn list_enabled(&self) -> Result<Vec<MonitoredTarget>> {
        let inner = self.inner.read().await;
        Ok(inner.targets.iter().filter(|t| t.enabled).cloned().collect())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn upsert(
        &self,
        public_key: &PublicKey,
        ip: &str,
        location: &str,
    ) -> Result<ValidatorRecord> {
        let mut inner = self.inner.write().await;
        let now = SystemTime::now();

        let record = inner.validators.entry(*public_key).or_insert_with(|| ValidatorRecord {
            id: Uuid::new_v4(),
            public_key: *public_key,
            ip: ip.to_string(),
            location: location.to_string(),
            first_seen: now,
            last_seen: now,
            payment: 0,
        });

        record.ip = ip.to_string();
        record.location = location.to_string();
        record.last_seen = now;

        Ok(record.clone())
    }
}

#[async_trait]
impl ResultSink for MemoryStore {
    async fn record(&self, tick: NewTick) -> Result<Tick> {
        let mut inner = self.inner.write().await;

        if !inner.targets.iter().any(|t| t.id == tick.target_id) {
            return Err(anyhow!("Target not found: {}", tick.target_id));
        }

        let tick = Tick::from_new(Uuid::new_v4(), tick);
        inner.ticks.entry(tick.target_id).or_default().push(tick.clone());
        Ok(tick)
    }
}

#[async_trait]
impl TickReader for MemoryStore {
    async fn recent_ticks(&self, target_id: Uuid, limit: usize) -> Result<Vec<Tick>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ticks
            .get(&target_id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TargetAdmin for MemoryStore {
    async fn add_target(&self, url: &str, owner: &str) -> Result<MonitoredTarget> {
        super::validate_target_url(url)?;

        let mut inner = self.inner.write().await;
        if inner.targets.iter().any(|t| t.url == url) {
            return Err(anyhow!("Target already exists: {url}"));
        }

        let target = MonitoredTarget::new(url, owner);
        inner.targets.push(target.clone());
        Ok(target)
    }

    async fn find_target_by_url(&self, url: &str) -> Result<Option<MonitoredTarget>> {
        let inner = self.inner.read().await;
        Ok(inner.targets.iter().find(|t| t.url == url).cloned())
    }

    async fn set_enabled(&self, target_id: Uuid, enabled: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.targets.iter_mut().find(|t| t.id == target_id) {
            Some(target) => {
                target.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
