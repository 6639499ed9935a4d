//! In-process pipeline metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Value that moves both ways, e.g. busy workers.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn set(&self, val: i64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram with upper-bound buckets in milliseconds.
///
/// Bounds are sized for external calls (ATS, analysis service), which
/// routinely take seconds.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; BUCKET_BOUNDS_MS.len() + 1],
    sum_ms: AtomicU64,
    count: AtomicU64,
}

const BUCKET_BOUNDS_MS: [u64; 10] = [5, 25, 100, 250, 500, 1_000, 2_500, 5_000, 15_000, 60_000];

impl Histogram {
    pub fn observe(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        let idx = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// `(upper bound, count)` pairs; the overflow bucket has bound `None`.
    pub fn buckets(&self) -> Vec<(Option<u64>, u64)> {
        BUCKET_BOUNDS_MS
            .iter()
            .map(|&b| Some(b))
            .chain(std::iter::once(None))
            .zip(self.buckets.iter())
            .map(|(bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Metrics shared by the API and the workers.
#[derive(Debug, Default)]
pub struct Metrics {
    // Webhook ingress
    pub webhooks_received: Counter,
    pub webhooks_rejected: Counter,
    pub webhooks_duplicate: Counter,

    // Queue and enrichment
    pub enqueued: Counter,
    pub enrichment_succeeded: Counter,
    pub enrichment_retried: Counter,
    pub enrichment_failed: Counter,
    pub consent_refusals: Counter,
    pub stale_reclaimed: Counter,

    // ATS
    pub ats_requests: Counter,
    pub ats_retries: Counter,
    pub ats_circuit_rejections: Counter,
    pub token_refreshes: Counter,
    pub token_refresh_failures: Counter,
    pub sync_runs: Counter,

    // Scoring
    pub scores_served: Counter,
    pub score_cache_hits: Counter,

    // Correlator and notifications
    pub retargets_emitted: Counter,
    pub notifications_sent: Counter,
    pub notifications_failed: Counter,

    // Retention
    pub records_expired: Counter,
    pub access_entries_purged: Counter,

    // Latency
    pub ats_latency: Histogram,
    pub analysis_latency: Histogram,
    pub webhook_latency: Histogram,

    pub busy_workers: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            webhooks_received: self.webhooks_received.get(),
            webhooks_rejected: self.webhooks_rejected.get(),
            webhooks_duplicate: self.webhooks_duplicate.get(),
            enqueued: self.enqueued.get(),
            enrichment_succeeded: self.enrichment_succeeded.get(),
            enrichment_retried: self.enrichment_retried.get(),
            enrichment_failed: self.enrichment_failed.get(),
            consent_refusals: self.consent_refusals.get(),
            stale_reclaimed: self.stale_reclaimed.get(),
            ats_requests: self.ats_requests.get(),
            ats_retries: self.ats_retries.get(),
            ats_circuit_rejections: self.ats_circuit_rejections.get(),
            token_refreshes: self.token_refreshes.get(),
            token_refresh_failures: self.token_refresh_failures.get(),
            sync_runs: self.sync_runs.get(),
            scores_served: self.scores_served.get(),
            score_cache_hits: self.score_cache_hits.get(),
            retargets_emitted: self.retargets_emitted.get(),
            notifications_sent: self.notifications_sent.get(),
            notifications_failed: self.notifications_failed.get(),
            records_expired: self.records_expired.get(),
            access_entries_purged: self.access_entries_purged.get(),
            ats_latency_mean_ms: self.ats_latency.mean_ms(),
            analysis_latency_mean_ms: self.analysis_latency.mean_ms(),
            webhook_latency_mean_ms: self.webhook_latency.mean_ms(),
            busy_workers: self.busy_workers.get(),
        }
    }
}

/// Point-in-time view of [`Metrics`], served by the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub webhooks_received: u64,
    pub webhooks_rejected: u64,
    pub webhooks_duplicate: u64,
    pub enqueued: u64,
    pub enrichment_succeeded: u64,
    pub enrichment_retried: u64,
    pub enrichment_failed: u64,
    pub consent_refusals: u64,
    pub stale_reclaimed: u64,
    pub ats_requests: u64,
    pub ats_retries: u64,
    pub ats_circuit_rejections: u64,
    pub token_refreshes: u64,
    pub token_refresh_failures: u64,
    pub sync_runs: u64,
    pub scores_served: u64,
    pub score_cache_hits: u64,
    pub retargets_emitted: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub records_expired: u64,
    pub access_entries_purged: u64,
    pub ats_latency_mean_ms: f64,
    pub analysis_latency_mean_ms: f64,
    pub webhook_latency_mean_ms: f64,
    pub busy_workers: i64,
}
