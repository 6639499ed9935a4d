//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline_core::{EnrichmentQueueEntry, QueueStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accepted enrichment request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub entry_id: Uuid,
    pub candidate_id: String,
    pub status: QueueStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub rerun_requested: bool,
}

impl From<EnrichmentQueueEntry> for EnqueueResponse {
    fn from(entry: EnrichmentQueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            candidate_id: entry.candidate_id.to_string(),
            status: entry.status,
            priority: entry.priority,
            retry_count: entry.retry_count,
            rerun_requested: entry.rerun_requested,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error carrying a stable error code.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
            retry_after: None,
        }
    }

    pub fn validation(code: impl Into<String>, errors: Vec<String>) -> Self {
        let mut err = Self::with_code(StatusCode::BAD_REQUEST, code, "Validation failed");
        err.response = err.response.with_details(errors);
        err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<pipeline_core::Error> for ApiError {
    fn from(err: pipeline_core::Error) -> Self {
        let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &err {
            pipeline_core::Error::TransientExternal { retry_after, .. } => retry_after.map(|d| d.as_secs().max(1)),
            _ => None,
        };
        let message = match &err {
            // Store and internal failures are not echoed to callers.
            pipeline_core::Error::Store(_) | pipeline_core::Error::Internal(_) => "Internal error".to_string(),
            _ => err.to_string(),
        };
        Self {
            status,
            response: ErrorResponse::new(message, err.code()),
            retry_after,
        }
    }
}
