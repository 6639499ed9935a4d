//! AI analysis collaborator.
//!
//! Turns a candidate's profile text into a [`StructuredEnrichment`]. The
//! service is external; this module only owns the contract and an HTTP
//! implementation of it.

use std::time::Duration;

use async_trait::async_trait;
use pipeline_core::{Error, StructuredEnrichment};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::{debug, error};
use validator::Validate;

const SERVICE: &str = "ai_analysis";

/// Analysis service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-call timeout (ms)
    pub timeout_ms: u64,
    /// Malformed responses tolerated per entry before it fails for good
    pub malformed_retries: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8091".to_string(),
            api_key: None,
            timeout_ms: 30_000,
            malformed_retries: 2,
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum AnalysisError {
    /// Unavailable, rate limited or timed out.
    #[error("analysis service unavailable: {0}")]
    Transient(String),

    /// The service refused the request.
    #[error("analysis rejected: {0}")]
    Permanent(String),

    /// The service answered with something that is not a valid enrichment.
    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

impl From<AnalysisError> for Error {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Transient(msg) => Error::transient(SERVICE, msg),
            AnalysisError::Permanent(msg) => Error::permanent(SERVICE, msg, None),
            AnalysisError::Malformed(msg) => Error::permanent(SERVICE, format!("malformed response: {msg}"), None),
        }
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, profile_text: &str) -> Result<StructuredEnrichment, AnalysisError>;

    /// Liveness of the service, for the health registry.
    async fn probe(&self) -> bool {
        true
    }
}

/// Structural checks on a decoded enrichment.
pub fn check_enrichment(enrichment: &StructuredEnrichment) -> Result<(), AnalysisError> {
    enrichment
        .validate()
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    let finite = enrichment.skills.iter().all(|s| s.level.is_finite())
        && enrichment.experience.iter().all(|e| e.years.is_finite());
    if !finite {
        return Err(AnalysisError::Malformed("non-finite level or years".into()));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    profile_text: &'a str,
}

/// Analysis over HTTP: `POST {endpoint}/analyze`.
pub struct HttpAnalyzer {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl HttpAnalyzer {
    pub fn new(http: reqwest::Client, config: AnalysisConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, profile_text: &str) -> Result<StructuredEnrichment, AnalysisError> {
        let mut request = self
            .http
            .post(self.url("analyze"))
            .timeout(self.config.timeout())
            .json(&AnalyzeRequest { profile_text });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Transient(format!("timed out after {}ms", self.config.timeout_ms))
            } else {
                AnalysisError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AnalysisError::Transient(format!("service returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Permanent(format!("{status}: {body}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::Transient(e.to_string()))?;
        let enrichment: StructuredEnrichment =
            serde_json::from_slice(&body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
        check_enrichment(&enrichment)?;
        debug!(skills = enrichment.skills.len(), "Analysis complete");
        Ok(enrichment)
    }

    async fn probe(&self) -> bool {
        match self
            .http
            .get(self.url("health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                error!("Analysis health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::SkillAssessment;

    #[test]
    fn test_errors_map_onto_the_shared_taxonomy() {
        assert!(Error::from(AnalysisError::Transient("503".into())).is_transient());
        assert!(!Error::from(AnalysisError::Permanent("400".into())).is_transient());
        assert_eq!(Error::from(AnalysisError::Malformed("x".into())).code(), "EXT_002");
    }

    #[test]
    fn test_check_enrichment_rejects_out_of_range_values() {
        let mut enrichment = StructuredEnrichment::default();
        assert!(check_enrichment(&enrichment).is_ok());

        enrichment.skills.push(SkillAssessment {
            name: "rust".into(),
            level: f64::NAN,
        });
        assert!(matches!(check_enrichment(&enrichment), Err(AnalysisError::Malformed(_))));
    }

    #[test]
    fn test_malformed_body_does_not_decode() {
        let result: Result<StructuredEnrichment, _> = serde_json::from_str(r#"{"skills": "lots"}"#);
        assert!(result.is_err());
    }
}
