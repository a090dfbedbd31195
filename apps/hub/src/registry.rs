//! Live table of registered validator connections.
//!
//! Entries exist only while their transport is open. Nothing here is
//! persisted: after a hub restart every validator has to register again.

use guardian_proto::{HubMessage, PublicKey};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Process-unique id of one accepted transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Frames a connection may have queued before further sends are refused
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue of connection {0} is full")]
    Full(ConnectionId),
}

/// Outbound side of one validator connection.
///
/// Frames are queued to the connection's writer task. The queue is bounded:
/// a peer that stops reading gets refused sends instead of growing hub memory.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    addr: SocketAddr,
    sender: mpsc::Sender<HubMessage>,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr, sender: mpsc::Sender<HubMessage>) -> Self {
        Self { id: ConnectionId::next(), addr, sender }
    }

    /// Handle plus the receiving end its writer drains
    pub fn channel(addr: SocketAddr) -> (Self, mpsc::Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (Self::new(addr, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a frame without waiting
    pub fn send(&self, message: HubMessage) -> Result<(), SendError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A validator admitted to receive tasks
#[derive(Debug, Clone)]
pub struct ValidatorEntry {
    pub public_key: PublicKey,
    /// Durable store id, used to attribute ticks
    pub validator_id: Uuid,
    pub location: String,
    pub connected_at: SystemTime,
    pub connection: ConnectionHandle,
}

/// Serializable view of an entry for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorSummary {
    pub public_key: PublicKey,
    pub validator_id: Uuid,
    pub location: String,
    pub address: SocketAddr,
    pub connection: ConnectionId,
    pub connected_at: SystemTime,
}

impl From<&ValidatorEntry> for ValidatorSummary {
    fn from(entry: &ValidatorEntry) -> Self {
        Self {
            public_key: entry.public_key,
            validator_id: entry.validator_id,
            location: entry.location.clone(),
            address: entry.connection.addr(),
            connection: entry.connection.id(),
            connected_at: entry.connected_at,
        }
    }
}

/// Public key -> live connection, at most one entry per key
#[derive(Default)]
pub struct ValidatorRegistry {
    entries: RwLock<HashMap<PublicKey, ValidatorEntry>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a validator. The newest connection for a key wins; the replaced
    /// entry, if any, is returned. A connection switching to another key also
    /// drops its old entry.
    pub async fn admit(&self, entry: ValidatorEntry) -> Option<ValidatorEntry> {
        let mut entries = self.entries.write().await;
        let conn = entry.connection.id();

        entries.retain(|key, existing| *key == entry.public_key || existing.connection.id() != conn);
        entries.insert(entry.public_key, entry)
    }

    /// Remove whatever entry is bound to this connection.
    ///
    /// Keyed by connection so a stale socket closing cannot evict a newer
    /// registration of the same key.
    pub async fn remove(&self, connection: ConnectionId) -> Option<ValidatorEntry> {
        let mut entries = self.entries.write().await;
        let key = entries
            .iter()
            .find(|(_, entry)| entry.connection.id() == connection)
            .map(|(key, _)| *key)?;

        entries.remove(&key)
    }

    /// Point-in-time copy, safe to iterate while the table keeps changing
    pub async fn list(&self) -> Vec<ValidatorEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn get(&self, public_key: &PublicKey) -> Option<ValidatorEntry> {
        self.entries.read().await.get(public_key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn summaries(&self) -> Vec<ValidatorSummary> {
        let entries = self.entries.read().await;
        let mut summaries: Vec<ValidatorSummary> = entries.values().map(Into::into).collect();
        summaries.sort_by_key(|s| s.connected_at);
        summaries
    }
}
