use anyhow::{Result, anyhow};
use std::time::{Duration, Instant};

/// What a completed probe observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub latency_ms: u64,
    pub status_code: u16,
}

/// Checker trait for performing a single probe against a target
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe the target. Any HTTP response counts as a completed probe,
    /// whatever its status; only transport failures are errors.
    async fn check(&self, target: &str) -> Result<Probe>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("guardian-validator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<Probe> {
        let start = Instant::now();

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        Ok(Probe {
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: response.status().as_u16(),
        })
    }
}
