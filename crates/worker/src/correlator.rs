//! Event correlator.
//!
//! Periodically scans each tenant's `apply_started` events inside the window
//! `[now - W, now - abandon_after)`. A started event with no later
//! `apply_completed` for the same job and session is an abandoned
//! application: exactly one `retarget_triggered` event is derived from it
//! and handed to the notifier. Failed deliveries are retried on later sweeps
//! until `max_delivery_attempts`; the derived event itself is never emitted
//! twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipeline_core::{DeliveryAnnotation, Event, EventKind, Result, TenantId};
use pipeline_store::Stores;
use serde::{Deserialize, Serialize};
use telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::notifications::{Notification, Notifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// How far back a sweep looks (s)
    pub window_secs: i64,
    /// Grace period before a started application counts as abandoned (s)
    pub abandon_after_secs: i64,
    /// Sweep cadence (s)
    pub interval_secs: u64,
    /// Sweep lock lifetime (s)
    pub lock_ttl_secs: i64,
    /// Delivery attempts per derived event
    pub max_delivery_attempts: u32,
    /// Per-delivery timeout (ms)
    pub delivery_timeout_ms: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            window_secs: 86_400,
            abandon_after_secs: 1_800,
            interval_secs: 300,
            lock_ttl_secs: 120,
            max_delivery_attempts: 3,
            delivery_timeout_ms: 15_000,
        }
    }
}

impl CorrelatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What one tenant sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub completed: usize,
    pub emitted: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
    pub skipped: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: &SweepReport) {
        self.scanned += other.scanned;
        self.completed += other.completed;
        self.emitted += other.emitted;
        self.delivered += other.delivered;
        self.delivery_failed += other.delivery_failed;
        self.skipped += other.skipped;
    }
}

pub struct EventCorrelator {
    holder: String,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    template: String,
    config: CorrelatorConfig,
    metrics: Arc<Metrics>,
}

impl EventCorrelator {
    pub fn new(
        holder: impl Into<String>,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        template: impl Into<String>,
        config: CorrelatorConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            holder: holder.into(),
            stores,
            notifier,
            template: template.into(),
            config,
            metrics,
        }
    }

    /// Sweep every active tenant. A tenant whose sweep fails is logged and skipped.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut total = SweepReport::default();
        for tenant in self.stores.tenants.list_tenants().await? {
            if !tenant.active {
                continue;
            }
            match self.sweep_tenant(&tenant.id, now).await {
                Ok(Some(report)) => total.absorb(&report),
                Ok(None) => {}
                Err(e) => error!(tenant_id = %tenant.id, "Correlator sweep failed: {}", e),
            }
        }
        if total.emitted > 0 || total.delivery_failed > 0 {
            info!(
                scanned = total.scanned,
                emitted = total.emitted,
                delivered = total.delivered,
                delivery_failed = total.delivery_failed,
                "Correlator sweep complete"
            );
        }
        Ok(total)
    }

    /// Sweep one tenant under its sweep lock. `None` when another sweep holds it.
    pub async fn sweep_tenant(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<Option<SweepReport>> {
        let lock = format!("correlator:{tenant}");
        let ttl = chrono::Duration::seconds(self.config.lock_ttl_secs);
        if !self.stores.locks.try_acquire(&lock, &self.holder, ttl, now).await? {
            debug!(tenant_id = %tenant, "Correlator sweep already running");
            return Ok(None);
        }

        let result = self.sweep_locked(tenant, now).await;
        if let Err(e) = self.stores.locks.release(&lock, &self.holder).await {
            warn!(tenant_id = %tenant, "Failed to release sweep lock: {}", e);
        }
        result.map(Some)
    }

    async fn sweep_locked(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        // Earlier failed deliveries first, so a fresh failure waits for the next sweep.
        for event in self
            .stores
            .events
            .pending_deliveries(tenant, self.config.max_delivery_attempts)
            .await?
        {
            self.deliver(&event, now, &mut report).await?;
        }

        let from = now - chrono::Duration::seconds(self.config.window_secs);
        let until = now - chrono::Duration::seconds(self.config.abandon_after_secs);
        let started = self
            .stores
            .events
            .list(tenant, EventKind::ApplyStarted, from, until)
            .await?;

        for event in started {
            report.scanned += 1;
            if self.stores.events.derived_for(tenant, event.id).await?.is_some() {
                continue;
            }
            if self.stores.events.find_completion(&event).await?.is_some() {
                report.completed += 1;
                continue;
            }

            let (derived, created) = self
                .stores
                .events
                .append_derived_once(Event::retarget_for(&event, now)?)
                .await?;
            if !created {
                continue;
            }
            report.emitted += 1;
            self.metrics.retargets_emitted.inc();
            info!(
                tenant_id = %tenant,
                origin_event_id = %event.id,
                session_id = ?event.session_id,
                "Abandoned application, retarget triggered"
            );
            self.deliver(&derived, now, &mut report).await?;
        }

        Ok(report)
    }

    async fn deliver(&self, event: &Event, now: DateTime<Utc>, report: &mut SweepReport) -> Result<()> {
        let Some(notification) = Notification::retarget(event, &self.template) else {
            report.skipped += 1;
            self.annotate(event, DeliveryAnnotation::skipped(now)).await?;
            return Ok(());
        };

        let timeout = Duration::from_millis(self.config.delivery_timeout_ms);
        let outcome = match tokio::time::timeout(timeout, self.notifier.send(&notification)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("delivery timed out after {}ms", self.config.delivery_timeout_ms)),
        };

        match &outcome {
            Ok(()) => {
                report.delivered += 1;
                self.metrics.notifications_sent.inc();
            }
            Err(reason) => {
                report.delivery_failed += 1;
                self.metrics.notifications_failed.inc();
                warn!(
                    tenant_id = %event.tenant_id,
                    event_id = %event.id,
                    reason = %reason,
                    "Retarget notification failed"
                );
            }
        }
        let annotation = DeliveryAnnotation::record(event.delivery.as_ref(), outcome, now);
        self.annotate(event, annotation).await
    }

    async fn annotate(&self, event: &Event, annotation: DeliveryAnnotation) -> Result<()> {
        self.stores
            .events
            .annotate_delivery(
                &event.tenant_id,
                event.id,
                annotation,
                self.config.max_delivery_attempts,
            )
            .await?;
        Ok(())
    }
}
