use anyhow::Result;
use guardian_proto::TickStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::checker::{Checker, HttpChecker, Probe};
use super::validation::validate_target;

/// Classified outcome of one target check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    pub status: TickStatus,
    /// 0 when no HTTP response was received
    pub status_code: u16,
    pub latency_ms: u64,
}

impl CheckReport {
    fn failed(latency_ms: u64) -> Self {
        Self { status: TickStatus::Bad, status_code: 0, latency_ms }
    }
}

/// Map a completed probe onto a tick status
pub fn classify(probe: Probe, degraded_threshold_ms: u64) -> TickStatus {
    let healthy = (200..400).contains(&probe.status_code);

    if !healthy {
        TickStatus::Bad
    } else if probe.latency_ms > degraded_threshold_ms {
        TickStatus::Degraded
    } else {
        TickStatus::Good
    }
}

/// Monitoring executor - executes individual monitoring checks
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    degraded_threshold_ms: u64,
    allow_private_targets: bool,
}

impl MonitoringExecutor {
    /// Create an executor backed by the HTTP checker
    pub fn new(timeout: Duration, degraded_threshold_ms: u64, allow_private_targets: bool) -> Result<Self> {
        Ok(Self::with_checker(
            Arc::new(HttpChecker::new(timeout)?),
            degraded_threshold_ms,
            allow_private_targets,
        ))
    }

    pub fn with_checker(
        checker: Arc<dyn Checker>,
        degraded_threshold_ms: u64,
        allow_private_targets: bool,
    ) -> Self {
        Self { checker, degraded_threshold_ms, allow_private_targets }
    }

    /// Execute a check. Never fails: every problem becomes a `Bad` report.
    pub async fn execute_check(&self, target: &str) -> CheckReport {
        let url = match validate_target(target, self.allow_private_targets) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = target, "Refusing to check target: {}", e);
                return CheckReport::failed(0);
            }
        };

        let start = Instant::now();
        match self.checker.check(url.as_str()).await {
            Ok(probe) => {
                let status = classify(probe, self.degraded_threshold_ms);
                debug!(url = target, status = %status, code = probe.status_code, latency = probe.latency_ms, "Check complete");
                CheckReport { status, status_code: probe.status_code, latency_ms: probe.latency_ms }
            }
            Err(e) => {
                debug!(url = target, "Check failed: {}", e);
                CheckReport::failed(start.elapsed().as_millis() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedChecker {
        result: Option<Probe>,
        calls: AtomicUsize,
    }

    impl FixedChecker {
        fn new(result: Option<Probe>) -> Arc<Self> {
            Arc::new(Self { result, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait::async_trait]
    impl Checker for FixedChecker {
        async fn check(&self, _target: &str) -> Result<Probe> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.ok_or_else(|| anyhow!("connection refused"))
        }
    }

    fn probe(status_code: u16, latency_ms: u64) -> Probe {
        Probe { latency_ms, status_code }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(probe(200, 10), 1000), TickStatus::Good);
        assert_eq!(classify(probe(301, 10), 1000), TickStatus::Good);
        assert_eq!(classify(probe(204, 1000), 1000), TickStatus::Good);
        assert_eq!(classify(probe(200, 1001), 1000), TickStatus::Degraded);
        assert_eq!(classify(probe(404, 10), 1000), TickStatus::Bad);
        assert_eq!(classify(probe(503, 5000), 1000), TickStatus::Bad);
        assert_eq!(classify(probe(101, 10), 1000), TickStatus::Bad);
    }

    #[tokio::test]
    async fn test_success_is_reported() {
        let checker = FixedChecker::new(Some(probe(200, 42)));
        let executor = MonitoringExecutor::with_checker(checker.clone(), 1000, false);

        let report = executor.execute_check("https://example.com").await;
        assert_eq!(report, CheckReport { status: TickStatus::Good, status_code: 200, latency_ms: 42 });
    }

    #[tokio::test]
    async fn test_transport_error_is_bad_with_zero_code() {
        let checker = FixedChecker::new(None);
        let executor = MonitoringExecutor::with_checker(checker.clone(), 1000, false);

        let report = executor.execute_check("https://example.com").await;
        assert_eq!(report.status, TickStatus::Bad);
        assert_eq!(report.status_code, 0);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_target_is_never_requested() {
        let checker = FixedChecker::new(Some(probe(200, 1)));
        let executor = MonitoringExecutor::with_checker(checker.clone(), 1000, false);

        for target in ["::not a url::", "file:///etc/passwd", "http://127.0.0.1:8080"] {
            let report = executor.execute_check(target).await;
            assert_eq!(report, CheckReport { status: TickStatus::Bad, status_code: 0, latency_ms: 0 });
        }
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_private_target_allowed_when_opted_in() {
        let checker = FixedChecker::new(Some(probe(200, 1)));
        let executor = MonitoringExecutor::with_checker(checker.clone(), 1000, true);

        let report = executor.execute_check("http://127.0.0.1:8080").await;
        assert_eq!(report.status, TickStatus::Good);
    }
}
