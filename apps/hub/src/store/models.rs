use guardian_proto::{PublicKey, TickStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Durable validator record - the storage-side counterpart of a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    /// Storage id, used for joins only; the wire identity is the public key
    pub id: Uuid,
    pub public_key: PublicKey,
    pub ip: String,
    pub location: String,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    /// Accounting counter; carried, never computed by the hub
    pub payment: i64,
}

/// A URL the hub fans out to validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: Uuid,
    pub url: String,
    /// Owning account reference, opaque to the hub
    pub owner: String,
    pub enabled: bool,
}

impl MonitoredTarget {
    pub fn new(url: impl Into<String>, owner: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), url: url.into(), owner: owner.into(), enabled: true }
    }
}

/// A resolved check waiting to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTick {
    pub validator_id: Uuid,
    pub target_id: Uuid,
    pub status: TickStatus,
    pub latency_ms: u64,
    pub status_code: u16,
    pub timestamp: SystemTime,
}

/// Immutable result record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub id: Uuid,
    pub validator_id: Uuid,
    pub target_id: Uuid,
    pub status: TickStatus,
    pub latency_ms: u64,
    pub status_code: u16,
    pub timestamp: SystemTime,
}

impl Tick {
    pub fn from_new(id: Uuid, tick: NewTick) -> Self {
        Self {
            id,
            validator_id: tick.validator_id,
            target_id: tick.target_id,
            status: tick.status,
            latency_ms: tick.latency_ms,
            status_code: tick.status_code,
            timestamp: tick.timestamp,
        }
    }
}

/// Convert SystemTime to Unix milliseconds
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Convert Unix milliseconds to SystemTime
pub fn i64_to_timestamp(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}
