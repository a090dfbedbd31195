//! Periodic fan-out of check tasks.
//!
//! Each round takes a snapshot of the enabled targets and of the registry and
//! sends exactly one `ping` per (target, validator) pair. Rounds never wait
//! for replies, so they may overlap with the previous round's stragglers.

use anyhow::{Context, Result};
use guardian_proto::{HubMessage, PingRequest, TargetSpec, TaskId};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::correlator::{CallbackCorrelator, PendingTask};
use crate::registry::ValidatorRegistry;
use crate::store::TargetSource;

/// Counters for one dispatch round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub targets: usize,
    pub validators: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct TaskDispatcher {
    targets: Arc<dyn TargetSource>,
    registry: Arc<ValidatorRegistry>,
    correlator: Arc<CallbackCorrelator>,
    task_ttl: Duration,
    rounds: AtomicU64,
}

impl TaskDispatcher {
    pub fn new(
        targets: Arc<dyn TargetSource>,
        registry: Arc<ValidatorRegistry>,
        correlator: Arc<CallbackCorrelator>,
        task_ttl: Duration,
    ) -> Self {
        Self { targets, registry, correlator, task_ttl, rounds: AtomicU64::new(0) }
    }

    /// Number of rounds that have run to completion
    pub fn rounds_completed(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Run a single round.
    ///
    /// A failed send only affects its own pair: the task is cancelled and the
    /// round carries on with the remaining validators.
    pub async fn dispatch_round(&self) -> Result<RoundReport> {
        let targets = self.targets.list_enabled().await.context("Failed to list enabled targets")?;
        let validators = self.registry.list().await;

        let mut report = RoundReport {
            round: self.rounds.load(Ordering::Relaxed) + 1,
            targets: 0,
            validators: validators.len(),
            ..Default::default()
        };

        for target in targets.iter().filter(|t| t.enabled) {
            report.targets += 1;

            for validator in &validators {
                let id = TaskId::new();
                let task = PendingTask {
                    target_id: target.id,
                    target_url: target.url.clone(),
                    validator: validator.public_key,
                    dispatched_at: SystemTime::now(),
                };

                // Register before sending so a fast reply always finds its entry
                if !self.correlator.register(id, task, self.task_ttl).await {
                    warn!("Task id collision for {}, skipping pair", id);
                    report.failed += 1;
                    continue;
                }

                let ping = HubMessage::Ping(PingRequest {
                    callback_id: id,
                    targets: vec![TargetSpec { url: target.url.clone() }],
                });

                match validator.connection.send(ping) {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        warn!(validator = %validator.public_key, "Failed to send ping: {}", e);
                        self.correlator.cancel(&id).await;
                        report.failed += 1;
                    }
                }
            }
        }

        self.rounds.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Start the dispatch timer as a background task
    pub fn start(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.dispatch_round().await {
                    Ok(report) if report.sent > 0 || report.failed > 0 => info!(
                        "Dispatch round {}: {} targets x {} validators, {} sent, {} failed",
                        report.round, report.targets, report.validators, report.sent, report.failed
                    ),
                    Ok(report) => debug!(
                        "Dispatch round {}: nothing to send ({} targets, {} validators)",
                        report.round, report.targets, report.validators
                    ),
                    Err(e) => warn!("Dispatch round skipped: {:#}", e),
                }
            }
        })
    }
}
