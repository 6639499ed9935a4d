//! ATS connectivity checks.

use std::time::Duration;

use tracing::{debug, error};

use crate::config::AtsConfig;

/// Whether the ATS API answers at all. Any non-5xx response counts.
pub async fn check_connection(http: &reqwest::Client, config: &AtsConfig) -> bool {
    let probe = http
        .get(&config.base_url)
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .send()
        .await;

    match probe {
        Ok(response) if !response.status().is_server_error() => {
            debug!(status = %response.status(), "ATS reachable");
            true
        }
        Ok(response) => {
            error!(status = %response.status(), "ATS health check failed");
            false
        }
        Err(e) => {
            error!("ATS health check failed: {}", e);
            false
        }
    }
}
