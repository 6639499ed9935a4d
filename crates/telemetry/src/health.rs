//! Health aggregation for the store, the AI collaborator and ATS connectivity.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

#[derive(Debug, Default)]
struct Probe {
    message: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

/// Last known health of one dependency.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    probe: RwLock<Probe>,
}

impl ComponentHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            probe: RwLock::new(Probe {
                message: Some("not checked yet".to_string()),
                checked_at: None,
            }),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.probe.write() = Probe {
            message: None,
            checked_at: Some(Utc::now()),
        };
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.probe.write() = Probe {
            message: Some(msg.into()),
            checked_at: Some(Utc::now()),
        };
    }

    /// Record a probe outcome.
    pub fn record(&self, healthy: bool, failure: &str) {
        if healthy {
            self.set_healthy();
        } else {
            self.set_unhealthy(failure);
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn report(&self) -> ComponentHealthReport {
        let probe = self.probe.read();
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: probe.message.clone(),
            checked_at: probe.checked_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Health of the pipeline's dependencies.
///
/// The store is required to serve; the AI collaborator and the ATS only
/// degrade the service, since work queues up and drains once they recover.
#[derive(Debug)]
pub struct HealthRegistry {
    pub store: ComponentHealth,
    pub ai: ComponentHealth,
    pub ats: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            store: ComponentHealth::new("store"),
            ai: ComponentHealth::new("ai"),
            ats: ComponentHealth::new("ats"),
        }
    }

    pub fn report(&self) -> HealthReport {
        let components = vec![self.store.report(), self.ai.report(), self.ats.report()];

        let status = if !self.store.is_healthy() {
            HealthStatus::Unhealthy
        } else if components.iter().all(|c| c.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport { status, components }
    }

    /// Whether webhooks and score requests can be accepted.
    pub fn is_ready(&self) -> bool {
        self.store.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchecked_registry_is_unhealthy() {
        let health = HealthRegistry::new();
        assert_eq!(health.report().status, HealthStatus::Unhealthy);
        assert!(!health.is_ready());
    }

    #[test]
    fn test_collaborator_outage_only_degrades() {
        let health = HealthRegistry::new();
        health.store.set_healthy();
        health.ats.set_healthy();
        health.ai.set_unhealthy("analysis service timed out");

        let report = health.report();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.status.is_serving());
        assert!(health.is_ready());

        let ai = report.components.iter().find(|c| c.name == "ai").unwrap();
        assert_eq!(ai.message.as_deref(), Some("analysis service timed out"));
    }

    #[test]
    fn test_all_healthy() {
        let health = HealthRegistry::new();
        for component in [&health.store, &health.ai, &health.ats] {
            component.record(true, "unused");
        }
        assert_eq!(health.report().status, HealthStatus::Healthy);
    }
}
