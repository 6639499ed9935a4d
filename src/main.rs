//! Talent Pipeline
//!
//! Multi-tenant recruiting data pipeline handling:
//! - Signed ATS webhook ingress with replay protection
//! - ATS synchronization with per-tenant OAuth token refresh
//! - Consent-gated AI enrichment through a durable work queue
//! - Template-driven candidate benchmarking
//! - Abandoned-application correlation and retargeting notifications

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, ApiSettings, AppState, ScoreCacheConfig, WebhookConfig};
use ats_client::{AtsApi, AtsClient, AtsConfig, HttpTokenExchange, TokenManager};
use pipeline_core::{AtsConnection, Secret, Tenant, TenantId, TokenSet};
use pipeline_store::Stores;
use scoring::BenchmarkEngine;
use telemetry::{init_tracing, HealthRegistry, Metrics, TracingConfig};
use worker::{
    AnalysisConfig, Analyzer, ChannelNotifier, CorrelatorConfig, EnrichmentWorker, EnrichmentWorkerConfig,
    EventCorrelator, HttpAnalyzer, NotificationsConfig, QueueConfig, RetentionConfig, RetentionWorker,
    SchedulerConfig, SyncConfig, SyncService, WorkerScheduler,
};

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
    /// How long background tasks get to wind down after a shutdown signal (s)
    shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 30,
        }
    }
}

/// A tenant connected at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TenantSeed {
    id: String,
    name: String,
    webhook_secret: String,
    access_token: String,
    refresh_token: String,
    /// Access token lifetime left at startup (s); zero forces a refresh
    #[serde(default)]
    expires_in_secs: i64,
    /// Public URL the ATS should deliver webhooks to
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(default = "default_webhook_events")]
    webhook_events: Vec<String>,
}

fn default_webhook_events() -> Vec<String> {
    [
        "candidate.created",
        "candidate.updated",
        "job.created",
        "job.updated",
        "application.started",
        "application.completed",
    ]
    .map(String::from)
    .to_vec()
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    tracing: TracingConfig,
    ats: AtsConfig,
    queue: QueueConfig,
    worker: EnrichmentWorkerConfig,
    analysis: AnalysisConfig,
    notifications: NotificationsConfig,
    correlator: CorrelatorConfig,
    webhook: WebhookConfig,
    retention: RetentionConfig,
    scheduler: SchedulerConfig,
    sync: SyncConfig,
    score_cache: ScoreCacheConfig,
    tenants: Vec<TenantSeed>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config.tracing).context("Failed to initialize tracing")?;

    info!("Starting Talent Pipeline v{}", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthRegistry::new());
    let stores = Stores::in_memory();

    let http = reqwest::Client::builder()
        .timeout(config.ats.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    // ATS access
    let exchange = Arc::new(HttpTokenExchange::new(http.clone(), &config.ats));
    let tokens = Arc::new(TokenManager::new(
        stores.tenants.clone(),
        exchange,
        config.ats.refresh_margin(),
        metrics.clone(),
    ));
    let ats: Arc<dyn AtsApi> = Arc::new(AtsClient::new(
        config.ats.clone(),
        http.clone(),
        tokens,
        metrics.clone(),
    ));

    seed_tenants(&config.tenants, &stores, ats.as_ref()).await?;

    // Collaborators
    let analyzer: Arc<dyn Analyzer> = Arc::new(HttpAnalyzer::new(http.clone(), config.analysis.clone()));
    let notifier = Arc::new(ChannelNotifier::new(http.clone(), &config.notifications));

    let engine = BenchmarkEngine::new();

    let workers = (0..config.worker.concurrency)
        .map(|i| {
            Arc::new(EnrichmentWorker::new(
                format!("enrichment-{i}"),
                stores.clone(),
                ats.clone(),
                analyzer.clone(),
                engine,
                config.queue.clone(),
                config.worker.clone(),
                config.analysis.clone(),
                metrics.clone(),
            ))
        })
        .collect();

    let correlator = Arc::new(EventCorrelator::new(
        format!("correlator-{}", std::process::id()),
        stores.clone(),
        notifier,
        config.notifications.retarget_template.clone(),
        config.correlator.clone(),
        metrics.clone(),
    ));
    let retention = Arc::new(RetentionWorker::new(stores.clone(), metrics.clone()));
    let sync = Arc::new(SyncService::new(
        stores.clone(),
        ats.clone(),
        config.sync.clone(),
        metrics.clone(),
    ));

    let scheduler = Arc::new(
        WorkerScheduler::new(
            config.scheduler.clone(),
            config.queue.clone(),
            stores.clone(),
            health.clone(),
            metrics.clone(),
        )
        .with_enrichment_workers(workers)
        .with_correlator(correlator, config.correlator.interval())
        .with_retention(retention, config.retention.interval())
        .with_sync(sync.clone())
        .with_probes(analyzer, http, config.ats.clone()),
    );

    // Probe once so readiness reflects reality before the first request.
    scheduler.probe_health().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.start(shutdown_rx);

    let settings = ApiSettings {
        queue: config.queue.clone(),
        webhook: config.webhook.clone(),
        score_cache: config.score_cache.clone(),
    };
    let state = AppState::new(stores, engine, sync, settings, metrics, health);
    let app = router(state);

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down background workers...");
    if shutdown_tx.send(true).is_err() {
        warn!("All background workers already stopped");
    }

    let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let drained = tokio::time::timeout(timeout, async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Background task panicked: {}", e);
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "Background workers did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<AppConfig> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&AppConfig::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. TALENT__ATS__BASE_URL
        .add_source(
            config::Environment::with_prefix("TALENT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Store the configured tenants and their ATS connections, registering
/// webhook callbacks where a URL is configured.
async fn seed_tenants(seeds: &[TenantSeed], stores: &Stores, ats: &dyn AtsApi) -> Result<()> {
    for seed in seeds {
        let id = TenantId::parse(seed.id.as_str()).with_context(|| format!("Invalid tenant id {:?}", seed.id))?;
        stores
            .tenants
            .put_tenant(Tenant::new(id.clone(), &seed.name, Secret::new(&seed.webhook_secret)))
            .await
            .context("Failed to store tenant")?;
        let tokens = TokenSet {
            access_token: Secret::new(&seed.access_token),
            refresh_token: Secret::new(&seed.refresh_token),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(seed.expires_in_secs),
        };
        stores
            .tenants
            .put_connection(AtsConnection::new(id.clone(), tokens))
            .await
            .context("Failed to store ATS connection")?;
        info!(tenant_id = %id, "Tenant connected");

        let Some(callback) = &seed.callback_url else {
            continue;
        };
        let callback = url::Url::parse(callback).with_context(|| format!("Invalid callback URL for {id}"))?;
        // Registration failures leave the tenant on scheduled sync only.
        match ats.register_webhook(&id, &callback, &seed.webhook_events).await {
            Ok(registration) => info!(
                tenant_id = %id,
                registration_id = %registration.id,
                callback_url = %registration.callback_url,
                "Webhook registered"
            ),
            Err(e) => error!(tenant_id = %id, error = %e, "Webhook registration failed"),
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
