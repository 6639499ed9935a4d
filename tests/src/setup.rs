//! Common test setup functions.

use std::sync::Arc;

use api::{router, ApiSettings, AppState};
use axum::Router;
use axum_test::TestServer;
use pipeline_core::AtsConnection;
use pipeline_store::Stores;
use scoring::BenchmarkEngine;
use telemetry::{HealthRegistry, Metrics};
use worker::{
    AnalysisConfig, CorrelatorConfig, EnrichmentWorker, EnrichmentWorkerConfig, EventCorrelator, QueueConfig,
    SyncConfig, SyncService,
};

use crate::fixtures;
use crate::mocks::{MockAnalyzer, MockAtsApi, MockNotifier};

/// Test context with in-memory stores and mock collaborators.
///
/// This exercises the production code paths by:
/// - Using the real Axum router with all layers
/// - Using the real webhook ingress, scoring service, workers and correlator
/// - Swapping only the external collaborators (ATS, AI, notifications) for mocks
pub struct TestContext {
    pub stores: Stores,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
    pub ats: Arc<MockAtsApi>,
    pub analyzer: Arc<MockAnalyzer>,
    pub notifier: Arc<MockNotifier>,
    pub queue: QueueConfig,
    pub router: Router,
}

impl TestContext {
    /// A context with the fixture tenant onboarded and connected.
    pub async fn new() -> Self {
        Self::with_queue(QueueConfig::default()).await
    }

    pub async fn with_queue(queue: QueueConfig) -> Self {
        let stores = Stores::in_memory();
        stores
            .tenants
            .put_tenant(fixtures::tenant())
            .await
            .expect("tenant stored");
        stores
            .tenants
            .put_connection(AtsConnection::new(
                fixtures::tenant_id(),
                fixtures::token_set(chrono::Duration::hours(1)),
            ))
            .await
            .expect("connection stored");

        let metrics = Arc::new(Metrics::new());
        let health = Arc::new(HealthRegistry::new());
        let ats = MockAtsApi::new();
        let sync = Arc::new(SyncService::new(
            stores.clone(),
            ats.clone(),
            SyncConfig::default(),
            metrics.clone(),
        ));

        let settings = ApiSettings {
            queue: queue.clone(),
            ..Default::default()
        };
        let state = AppState::new(stores.clone(), BenchmarkEngine::new(), sync, settings, metrics.clone(), health.clone());

        Self {
            stores,
            metrics,
            health,
            ats,
            analyzer: MockAnalyzer::new(),
            notifier: MockNotifier::new(),
            queue,
            router: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// An enrichment worker wired to the context's mocks.
    pub fn worker(&self) -> EnrichmentWorker {
        EnrichmentWorker::new(
            "test-worker",
            self.stores.clone(),
            self.ats.clone(),
            self.analyzer.clone(),
            BenchmarkEngine::new(),
            self.queue.clone(),
            EnrichmentWorkerConfig::default(),
            AnalysisConfig::default(),
            self.metrics.clone(),
        )
    }

    /// Drain the queue with one worker; returns how many entries were processed.
    pub async fn drain_queue(&self) -> usize {
        let worker = self.worker();
        let mut processed = 0;
        while worker
            .process_next()
            .await
            .expect("queue processing")
            .is_some()
        {
            processed += 1;
        }
        processed
    }

    pub fn correlator(&self, config: CorrelatorConfig) -> EventCorrelator {
        EventCorrelator::new(
            "test-correlator",
            self.stores.clone(),
            self.notifier.clone(),
            "application_reminder",
            config,
            self.metrics.clone(),
        )
    }
}
