//! Worker scheduler for background tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ats_client::AtsConfig;
use chrono::Utc;
use pipeline_store::Stores;
use serde::{Deserialize, Serialize};
use telemetry::{HealthRegistry, Metrics};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::correlator::EventCorrelator;
use crate::enrichment::{EnrichmentWorker, QueueConfig};
use crate::retention::RetentionWorker;
use crate::sync::SyncService;

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Stale-lease reclaim interval (s)
    pub reclaim_interval_secs: u64,
    /// Health probe interval (s)
    pub health_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reclaim_interval_secs: 60,
            health_interval_secs: 30,
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: SchedulerConfig,
    queue: QueueConfig,
    stores: Stores,
    health: Arc<HealthRegistry>,
    metrics: Arc<Metrics>,
    workers: Vec<Arc<EnrichmentWorker>>,
    correlator: Option<(Arc<EventCorrelator>, Duration)>,
    retention: Option<(Arc<RetentionWorker>, Duration)>,
    sync: Option<Arc<SyncService>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    ats_probe: Option<(reqwest::Client, AtsConfig)>,
}

impl WorkerScheduler {
    pub fn new(
        config: SchedulerConfig,
        queue: QueueConfig,
        stores: Stores,
        health: Arc<HealthRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            queue,
            stores,
            health,
            metrics,
            workers: Vec::new(),
            correlator: None,
            retention: None,
            sync: None,
            analyzer: None,
            ats_probe: None,
        }
    }

    pub fn with_enrichment_workers(mut self, workers: Vec<Arc<EnrichmentWorker>>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_correlator(mut self, correlator: Arc<EventCorrelator>, every: Duration) -> Self {
        self.correlator = Some((correlator, every));
        self
    }

    pub fn with_retention(mut self, retention: Arc<RetentionWorker>, every: Duration) -> Self {
        self.retention = Some((retention, every));
        self
    }

    /// Scheduled syncs run on the service's own configured cadence.
    pub fn with_sync(mut self, sync: Arc<SyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Collaborators the health probe checks besides the store.
    pub fn with_probes(mut self, analyzer: Arc<dyn Analyzer>, http: reqwest::Client, ats: AtsConfig) -> Self {
        self.analyzer = Some(analyzer);
        self.ats_probe = Some((http, ats));
        self
    }

    /// Starts all background workers. Every task exits once `shutdown` flips
    /// to true, after finishing the unit of work it is in.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for worker in &self.workers {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { worker.run(shutdown).await }));
        }
        info!(count = self.workers.len(), "Enrichment workers started");

        let scheduler = self.clone();
        handles.push(tokio::spawn(every(
            "reclaim",
            Duration::from_secs(self.config.reclaim_interval_secs),
            shutdown.clone(),
            move || {
                let scheduler = scheduler.clone();
                async move { scheduler.reclaim_stale().await }
            },
        )));

        if let Some((correlator, period)) = self.correlator.clone() {
            handles.push(tokio::spawn(every("correlator", period, shutdown.clone(), move || {
                let correlator = correlator.clone();
                async move {
                    if let Err(e) = correlator.sweep_all(Utc::now()).await {
                        error!("Correlator error: {}", e);
                    }
                }
            })));
        }

        if let Some((retention, period)) = self.retention.clone() {
            handles.push(tokio::spawn(every("retention", period, shutdown.clone(), move || {
                let retention = retention.clone();
                async move {
                    if let Err(e) = retention.run(Utc::now()).await {
                        error!("Retention worker error: {}", e);
                    }
                }
            })));
        }

        if let Some(sync) = self.sync.clone().filter(|s| s.config().enabled) {
            let period = sync.config().interval();
            handles.push(tokio::spawn(every("sync", period, shutdown.clone(), move || {
                let sync = sync.clone();
                async move {
                    if let Err(e) = sync.sync_all().await {
                        error!("ATS sync error: {}", e);
                    }
                }
            })));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(every(
            "health",
            Duration::from_secs(self.config.health_interval_secs),
            shutdown,
            move || {
                let scheduler = scheduler.clone();
                async move { scheduler.probe_health().await }
            },
        )));

        info!("Background workers started");
        handles
    }

    async fn reclaim_stale(&self) {
        match self
            .stores
            .queue
            .reclaim_stale(self.queue.stale_after(), Utc::now())
            .await
        {
            Ok(0) => {}
            Ok(reclaimed) => {
                self.metrics.stale_reclaimed.add(reclaimed as u64);
                warn!(reclaimed, "Reclaimed stale enrichment entries");
            }
            Err(e) => error!("Stale reclaim error: {}", e),
        }
    }

    /// Refresh the health registry from live checks.
    pub async fn probe_health(&self) {
        let store_ok = pipeline_store::health::check_connection(&self.stores).await;
        self.health.store.record(store_ok, "store unreachable");

        if let Some(analyzer) = &self.analyzer {
            self.health.ai.record(analyzer.probe().await, "analysis service unreachable");
        }
        if let Some((http, config)) = &self.ats_probe {
            let ats_ok = ats_client::health::check_connection(http, config).await;
            self.health.ats.record(ats_ok, "ATS unreachable");
        }
    }
}

/// Run `tick` every `period` until shutdown. A tick in progress completes.
async fn every<F, Fut>(name: &'static str, period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!(task = name, "Background task stopped");
}
