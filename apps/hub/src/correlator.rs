//! Pending-task table: maps a task id to the target it was minted for.
//!
//! Every entry carries a deadline. Entries leave the table exactly once,
//! either through a matching reply or through expiry, so a late duplicate
//! reply always finds nothing. Expiry is enforced by the background sweeper
//! and again lazily whenever a reply looks an entry up.

use guardian_proto::{PublicKey, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// What the hub remembers about one dispatched check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub target_id: Uuid,
    pub target_url: String,
    /// Validator the ping was sent to; only its reply may resolve the task
    pub validator: PublicKey,
    pub dispatched_at: SystemTime,
}

/// Result of looking up a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The task was live and is now consumed
    Resolved(PendingTask),
    /// No such task: never issued, already answered, or already swept
    Unknown,
    /// The task was still in the table but past its deadline; it is dropped
    Expired,
    /// A different validator answered; the task stays pending
    WrongValidator,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

struct Entry {
    task: PendingTask,
    deadline: Instant,
}

#[derive(Default)]
pub struct CallbackCorrelator {
    pending: Mutex<HashMap<TaskId, Entry>>,
}

impl CallbackCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task until `ttl` elapses. Returns false, leaving the existing
    /// entry untouched, if the id is already live.
    pub async fn register(&self, id: TaskId, task: PendingTask, ttl: Duration) -> bool {
        self.register_at(id, task, ttl, Instant::now()).await
    }

    pub async fn register_at(&self, id: TaskId, task: PendingTask, ttl: Duration, now: Instant) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&id) {
            return false;
        }
        pending.insert(id, Entry { task, deadline: now + ttl });
        true
    }

    /// Consume the task if `responder` is the validator it was sent to.
    pub async fn resolve(&self, id: &TaskId, responder: &PublicKey) -> Resolution {
        self.resolve_at(id, responder, Instant::now()).await
    }

    pub async fn resolve_at(&self, id: &TaskId, responder: &PublicKey, now: Instant) -> Resolution {
        let mut pending = self.pending.lock().await;

        let Some(entry) = pending.get(id) else {
            return Resolution::Unknown;
        };

        if entry.deadline <= now {
            pending.remove(id);
            return Resolution::Expired;
        }

        if entry.task.validator != *responder {
            return Resolution::WrongValidator;
        }

        match pending.remove(id) {
            Some(entry) => Resolution::Resolved(entry.task),
            None => Resolution::Unknown,
        }
    }

    /// Drop a task without resolving it, e.g. when its ping never left
    pub async fn cancel(&self, id: &TaskId) -> Option<PendingTask> {
        self.pending.lock().await.remove(id).map(|entry| entry.task)
    }

    /// Evict every entry whose deadline has passed. No continuation runs for
    /// an evicted task; its result is simply never recorded.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now()).await
    }

    pub async fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, entry| entry.deadline > now);
        before - pending.len()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Start the periodic sweep as a background task
    pub fn start_sweeper(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let evicted = self.sweep_expired().await;
                if evicted > 0 {
                    debug!("Correlator sweep evicted {} expired tasks", evicted);
                }
            }
        })
    }
}
