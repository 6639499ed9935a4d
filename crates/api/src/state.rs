//! Application state shared across handlers.

use std::sync::Arc;

use pipeline_store::Stores;
use scoring::BenchmarkEngine;
use telemetry::{HealthRegistry, Metrics};
use worker::{QueueConfig, SyncService};

use crate::scoring::{ScoreCacheConfig, ScoringService};
use crate::webhook::{WebhookConfig, WebhookIngress};

/// Settings the HTTP surface needs beyond its collaborators.
#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
    pub queue: QueueConfig,
    pub webhook: WebhookConfig,
    pub score_cache: ScoreCacheConfig,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub webhooks: Arc<WebhookIngress>,
    pub scores: Arc<ScoringService>,
    pub sync: Arc<SyncService>,
    pub queue: QueueConfig,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        engine: BenchmarkEngine,
        sync: Arc<SyncService>,
        settings: ApiSettings,
        metrics: Arc<Metrics>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        let webhooks = WebhookIngress::new(
            stores.clone(),
            settings.queue.clone(),
            settings.webhook,
            metrics.clone(),
        );
        let scores = ScoringService::new(
            stores.clone(),
            engine,
            &settings.score_cache,
            metrics.clone(),
        );
        Self {
            stores,
            webhooks: Arc::new(webhooks),
            scores: Arc::new(scores),
            sync,
            queue: settings.queue,
            metrics,
            health,
        }
    }
}
