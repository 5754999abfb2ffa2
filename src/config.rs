//! Engine configuration.

use std::time::Duration;

/// Configuration for the webhook engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 32-byte key for AES-256-GCM encryption of subscription secrets.
    pub encryption_key: Vec<u8>,
    /// Ceiling on delivery attempts per record before it goes terminal.
    pub max_attempts: u32,
    /// Per-request timeout for delivery HTTP calls.
    pub request_timeout: Duration,
    /// Backoff table indexed by attempt number (attempt 1 failure waits
    /// `backoff[0]`, and so on). Attempts beyond the table length reuse the
    /// last entry.
    pub backoff: Vec<Duration>,
    /// User-Agent header sent on delivery requests.
    pub user_agent: String,
    /// Byte cap applied to stored response body excerpts.
    pub response_body_cap: usize,
    /// Reject subscription URLs pointing at private/internal networks.
    /// Disable for local development against loopback endpoints.
    pub block_private_networks: bool,
    /// Upper bound on concurrently executing deliveries.
    pub max_concurrent_deliveries: usize,
}

impl EngineConfig {
    /// Create a configuration with the reference defaults.
    #[must_use]
    pub fn new(encryption_key: Vec<u8>) -> Self {
        Self {
            encryption_key,
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            backoff: vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900),
            ],
            user_agent: "webhook-relay/1.0".to_string(),
            response_body_cap: 4096,
            block_private_networks: true,
            max_concurrent_deliveries: 64,
        }
    }

    /// Set the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Set the delivery request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the backoff table. Empty tables are ignored.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        if !backoff.is_empty() {
            self.backoff = backoff;
        }
        self
    }

    /// Allow delivery to private/internal network destinations.
    #[must_use]
    pub fn with_private_networks_allowed(mut self) -> Self {
        self.block_private_networks = false;
        self
    }

    /// Set the response body excerpt cap in bytes.
    #[must_use]
    pub fn with_response_body_cap(mut self, cap: usize) -> Self {
        self.response_body_cap = cap;
        self
    }

    /// Set the bound on concurrently executing deliveries.
    #[must_use]
    pub fn with_max_concurrent_deliveries(mut self, max: usize) -> Self {
        self.max_concurrent_deliveries = max.max(1);
        self
    }

    /// Look up the wait before the retry following a failed attempt.
    ///
    /// `attempt_number` is 1-based; values past the end of the table reuse
    /// the last entry. A hand-built config with an empty table falls back
    /// to one minute.
    #[must_use]
    pub fn backoff_for(&self, attempt_number: u32) -> Duration {
        let idx = attempt_number.saturating_sub(1) as usize;
        self.backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }
}
