//! ATS client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// ATS connectivity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtsConfig {
    /// Base URL of the ATS REST API
    pub base_url: String,
    /// OAuth token endpoint
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Concurrent requests allowed per tenant
    pub max_concurrency_per_tenant: usize,
    /// How long a caller waits for a concurrency slot (ms)
    pub acquire_timeout_ms: u64,
    /// Per-request timeout (ms)
    pub request_timeout_ms: u64,
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Backoff base delay (ms)
    pub base_delay_ms: u64,
    /// Backoff cap (ms)
    pub max_delay_ms: u64,
    /// Consecutive failures that open the circuit
    pub circuit_failure_threshold: u32,
    /// Open-circuit cooldown before a half-open probe (ms)
    pub circuit_cooldown_ms: u64,
    /// Refresh tokens expiring within this margin (s)
    pub token_refresh_margin_secs: i64,
    /// Page size for list calls
    pub page_size: u32,
}

impl Default for AtsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090/api/v1".to_string(),
            token_url: "http://localhost:8090/oauth/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            max_concurrency_per_tenant: 4,
            acquire_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            circuit_failure_threshold: 5,
            circuit_cooldown_ms: 30_000,
            token_refresh_margin_secs: 60,
            page_size: 100,
        }
    }
}

impl AtsConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_margin_secs)
    }
}
