//! Tenant and ATS connection types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ids::TenantId;
use crate::retention::RetentionPolicy;

/// A secret string that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A tenant in the system.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Tenant {
    /// Unique tenant ID
    pub id: TenantId,
    /// Display name
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Shared secret the ATS signs webhooks with
    pub webhook_secret: Secret,
    /// Data retention policy
    pub retention: RetentionPolicy,
    /// Whether the tenant is active
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates a new tenant with default settings.
    pub fn new(id: TenantId, name: impl Into<String>, webhook_secret: Secret) -> Self {
        Self {
            id,
            name: name.into(),
            webhook_secret,
            retention: RetentionPolicy::default(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// OAuth token set issued by the ATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: Secret,
    pub refresh_token: Secret,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Whether the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at <= now + margin
    }
}

/// Status of a tenant's ATS connection, surfaced to the admin layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    /// Token refresh failed; the tenant must re-authorize.
    Broken {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// A tenant's connection to its ATS account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtsConnection {
    pub tenant_id: TenantId,
    pub tokens: TokenSet,
    pub status: ConnectionStatus,
    /// Sync cursor: records updated after this instant are pulled next.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AtsConnection {
    pub fn new(tenant_id: TenantId, tokens: TokenSet) -> Self {
        Self {
            tenant_id,
            tokens,
            status: ConnectionStatus::Connected,
            last_synced_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Flip the connection to broken.
    pub fn mark_broken(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = ConnectionStatus::Broken {
            reason: reason.into(),
            since: now,
        };
        self.updated_at = now;
    }

    /// Install a refreshed token set.
    pub fn refresh(&mut self, tokens: TokenSet, now: DateTime<Utc>) {
        self.tokens = tokens;
        self.status = ConnectionStatus::Connected;
        self.updated_at = now;
    }
}
