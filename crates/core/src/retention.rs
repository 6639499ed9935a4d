//! Data retention policy definitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Retention tier for tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    #[default]
    Standard,
    Extended,
    Enterprise,
}

impl RetentionTier {
    /// Enrichment record retention in days.
    pub fn enrichment_retention_days(&self) -> i64 {
        match self {
            Self::Standard => 180,       // ~6 months
            Self::Extended => 365,       // 1 year
            Self::Enterprise => 2 * 365, // 2 years default, configurable
        }
    }

    /// Access log retention in days. Audit trails outlive the data they cover.
    pub fn access_log_retention_days(&self) -> i64 {
        match self {
            Self::Standard => 365,
            Self::Extended => 2 * 365,
            Self::Enterprise => 7 * 365,
        }
    }
}

/// Retention policy configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct RetentionPolicy {
    /// Tier this policy applies to
    pub tier: RetentionTier,
    /// Enrichment retention override (days)
    pub enrichment_retention_days: Option<i64>,
    /// Access log retention override (days)
    pub access_log_retention_days: Option<i64>,
}

impl RetentionPolicy {
    /// Creates a policy from a tier with default values.
    pub fn from_tier(tier: RetentionTier) -> Self {
        Self {
            tier,
            enrichment_retention_days: None,
            access_log_retention_days: None,
        }
    }

    /// Returns the effective enrichment retention.
    pub fn effective_enrichment_retention(&self) -> Duration {
        Duration::days(
            self.enrichment_retention_days
                .unwrap_or_else(|| self.tier.enrichment_retention_days()),
        )
    }

    /// Returns the effective access log retention.
    pub fn effective_access_log_retention(&self) -> Duration {
        Duration::days(
            self.access_log_retention_days
                .unwrap_or_else(|| self.tier.access_log_retention_days()),
        )
    }

    /// Retention date stamped on a record created at `created_at`.
    pub fn retention_date_from(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.effective_enrichment_retention()
    }
}
