//! Unified error taxonomy for the talent pipeline.
//!
//! Error codes:
//! - EXT_001-002: External collaborator errors (transient / permanent)
//! - AUTH_001-003: Tenant connection and caller identity errors
//! - PRIV_001: Privacy gate (consent) errors
//! - HOOK_001-002: Webhook ingress errors
//! - VALID_001-003: Validation errors
//! - NF_001: Missing entities
//! - QUEUE_001-002: Enrichment queue state errors
//! - TPL_001: Benchmark template errors
//! - DB_001: Store errors

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// AUTH_001: Token refresh failed, the ATS connection is broken
    TenantDisconnected,
    /// AUTH_002: Tenant never connected an ATS account
    MissingCredentials,
    /// AUTH_003: Privileged read without an identified caller
    MissingActor,
}

impl AuthErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TenantDisconnected => "AUTH_001",
            Self::MissingCredentials => "AUTH_002",
            Self::MissingActor => "AUTH_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TenantDisconnected => 409,
            Self::MissingCredentials => 409,
            Self::MissingActor => 401,
        }
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Invalid field value or shape
    InvalidFormat,
    /// VALID_002: Unsupported webhook event type
    UnsupportedEvent,
    /// VALID_003: Payload exceeds size limit
    PayloadTooLarge,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::UnsupportedEvent => "VALID_002",
            Self::PayloadTooLarge => "VALID_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::PayloadTooLarge => 413,
            _ => 400,
        }
    }
}

/// Unified error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// External call failed in a way that may succeed on retry
    /// (timeouts, connection errors, 429, 5xx, open circuit).
    #[error("[EXT_001] {service} unavailable: {message}")]
    TransientExternal {
        service: &'static str,
        message: String,
        retry_after: Option<Duration>,
    },

    /// External call failed in a way retrying cannot fix
    /// (4xx other than 429, malformed payloads).
    #[error("[EXT_002] {service} rejected request: {message}")]
    PermanentExternal {
        service: &'static str,
        message: String,
        status: Option<u16>,
    },

    /// Authentication / connection error with code.
    #[error("[{code}] {message}")]
    Auth {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Candidate has not granted data-usage consent.
    #[error("[PRIV_001] data usage consent required for candidate {candidate_id}")]
    ConsentRequired { candidate_id: String },

    #[error("[HOOK_001] invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("[HOOK_002] duplicate delivery: {dedup_key}")]
    DuplicateDelivery { dedup_key: String },

    /// Validation error with code.
    #[error("[{code}] {message}")]
    Validation {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("[NF_001] {entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The queue entry was reclaimed or finished by someone else.
    #[error("[QUEUE_001] lease lost for queue entry {entry_id}")]
    LeaseLost { entry_id: String },

    #[error("[QUEUE_002] invalid queue transition: {0}")]
    InvalidTransition(String),

    /// Template is referenced by a completed score and must be re-versioned.
    #[error("[TPL_001] template {template_id} is referenced by completed scores; bump its version")]
    TemplateLocked { template_id: String },

    #[error("[DB_001] store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transient(service: &'static str, msg: impl Into<String>) -> Self {
        Self::TransientExternal {
            service,
            message: msg.into(),
            retry_after: None,
        }
    }

    pub fn permanent(service: &'static str, msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::PermanentExternal {
            service,
            message: msg.into(),
            status,
        }
    }

    /// Create an authentication error.
    pub fn auth(code: AuthErrorCode, msg: impl Into<String>) -> Self {
        Self::Auth {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a validation error with code.
    pub fn validation_code(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_code(ValidationErrorCode::InvalidFormat, msg)
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure may succeed if the same call is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientExternal { .. })
    }

    /// Whether this is the tenant-disconnected auth error.
    pub fn is_tenant_disconnected(&self) -> bool {
        matches!(self, Self::Auth { code, .. } if *code == AuthErrorCode::TenantDisconnected.code())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TransientExternal { .. } => 503,
            Self::PermanentExternal { .. } => 502,
            Self::Auth { http_status, .. } => *http_status,
            Self::ConsentRequired { .. } => 409,
            Self::InvalidSignature(_) => 401,
            Self::DuplicateDelivery { .. } => 200,
            Self::Validation { http_status, .. } => *http_status,
            Self::NotFound { .. } => 404,
            Self::LeaseLost { .. } => 409,
            Self::InvalidTransition(_) => 409,
            Self::TemplateLocked { .. } => 409,
            Self::Store(_) => 500,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientExternal { .. } => "EXT_001",
            Self::PermanentExternal { .. } => "EXT_002",
            Self::Auth { code, .. } => code,
            Self::ConsentRequired { .. } => "PRIV_001",
            Self::InvalidSignature(_) => "HOOK_001",
            Self::DuplicateDelivery { .. } => "HOOK_002",
            Self::Validation { code, .. } => code,
            Self::NotFound { .. } => "NF_001",
            Self::LeaseLost { .. } => "QUEUE_001",
            Self::InvalidTransition(_) => "QUEUE_002",
            Self::TemplateLocked { .. } => "TPL_001",
            Self::Store(_) => "DB_001",
            Self::Serialization(_) => "VALID_001",
            Self::Internal(_) => "INT_001",
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(errors.to_string())
    }
}
