//! Enrichment worker.
//!
//! Drains the enrichment queue: for each dequeued entry
//! 1. Assemble the candidate's source material (local copy, else the ATS)
//! 2. Refuse without data-usage consent
//! 3. Call the analysis service (malformed answers retried a few times)
//! 4. Upsert the enrichment record and score it against the tenant's templates
//! 5. Mark the entry done, or hand the failure back to the queue's retry path

use std::sync::Arc;
use std::time::{Duration, Instant};

use ats_client::{AtsApi, Backoff};
use chrono::{DateTime, Utc};
use pipeline_core::{
    BenchmarkTemplate, Candidate, CandidateEnrichmentRecord, CandidateId, EnqueueMode, EnrichmentQueueEntry, Error,
    FailOutcome, FailureDisposition, Lease, QueueStatus, Result, StructuredEnrichment, TemplateId,
    TenantId, ValidationErrorCode, GENERAL_TEMPLATE_ID,
};
use pipeline_store::{FailureReport, Stores};
use scoring::BenchmarkEngine;
use serde::{Deserialize, Serialize};
use telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::analyzer::{AnalysisConfig, AnalysisError, Analyzer};

/// Enrichment queue policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Failures after which an entry is terminally failed
    pub max_retries: u32,
    /// Retry backoff base (ms)
    pub retry_base_delay_ms: u64,
    /// Retry backoff cap (ms)
    pub retry_max_delay_ms: u64,
    /// Processing entries older than this are reclaimed (s)
    pub stale_after_secs: i64,
    /// Priority of entries created by webhooks
    pub webhook_priority: i32,
    /// Priority of entries created through the enrichment endpoint
    pub api_priority: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 600_000,
            stale_after_secs: 600,
            webhook_priority: 10,
            api_priority: 50,
        }
    }
}

impl QueueConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs)
    }
}

/// Enrichment worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentWorkerConfig {
    /// Concurrent workers draining the queue
    pub concurrency: usize,
    /// Sleep between polls of an empty queue (ms)
    pub poll_interval_ms: u64,
    /// Upper bound on one entry's processing (ms)
    pub process_timeout_ms: u64,
}

impl Default for EnrichmentWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 500,
            process_timeout_ms: 120_000,
        }
    }
}

impl EnrichmentWorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }
}

/// What happened to one dequeued entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// Finished. `Pending` when a re-enqueue arrived mid-flight.
    Completed(QueueStatus),
    Retrying {
        retry_count: u32,
        available_at: DateTime<Utc>,
    },
    Failed {
        retry_count: u32,
        code: &'static str,
    },
    /// The entry was reclaimed or finished elsewhere; the result was dropped.
    LeaseLost,
}

/// Which errors the queue may retry.
fn disposition(error: &Error) -> FailureDisposition {
    if error.is_transient() {
        FailureDisposition::Retry
    } else {
        FailureDisposition::Terminal
    }
}

pub struct EnrichmentWorker {
    id: String,
    stores: Stores,
    ats: Arc<dyn AtsApi>,
    analyzer: Arc<dyn Analyzer>,
    engine: BenchmarkEngine,
    queue: QueueConfig,
    config: EnrichmentWorkerConfig,
    analysis: AnalysisConfig,
    metrics: Arc<Metrics>,
}

impl EnrichmentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        stores: Stores,
        ats: Arc<dyn AtsApi>,
        analyzer: Arc<dyn Analyzer>,
        engine: BenchmarkEngine,
        queue: QueueConfig,
        config: EnrichmentWorkerConfig,
        analysis: AnalysisConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id: id.into(),
            stores,
            ats,
            analyzer,
            engine,
            queue,
            config,
            analysis,
            metrics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dequeue and process one entry. `None` when nothing is ready.
    pub async fn process_next(&self) -> Result<Option<Processed>> {
        let Some(entry) = self.stores.queue.dequeue_next(&self.id, Utc::now()).await? else {
            return Ok(None);
        };
        let Some(lease) = entry.lease.clone() else {
            return Err(Error::internal(format!("dequeued entry {} carries no lease", entry.id)));
        };

        debug!(
            worker = %self.id,
            tenant_id = %entry.tenant_id,
            candidate_id = %entry.candidate_id,
            retry_count = entry.retry_count,
            "Processing enrichment entry"
        );

        self.metrics.busy_workers.add(1);
        let result = match tokio::time::timeout(self.config.process_timeout(), self.enrich(&entry)).await {
            Ok(result) => result,
            Err(_) => Err(Error::transient(
                "enrichment",
                format!("processing exceeded {}ms", self.config.process_timeout_ms),
            )),
        };
        self.metrics.busy_workers.add(-1);

        let processed = match result {
            Ok(()) => self.finish(&entry, &lease).await,
            Err(e) => self.fail(&entry, &lease, &e).await,
        }?;
        Ok(Some(processed))
    }

    async fn finish(&self, entry: &EnrichmentQueueEntry, lease: &Lease) -> Result<Processed> {
        match self.stores.queue.mark_done(entry.id, lease.id, Utc::now()).await {
            Ok(status) => {
                self.metrics.enrichment_succeeded.inc();
                info!(
                    tenant_id = %entry.tenant_id,
                    candidate_id = %entry.candidate_id,
                    status = ?status,
                    "Enrichment complete"
                );
                Ok(Processed::Completed(status))
            }
            Err(Error::LeaseLost { .. }) => {
                warn!(entry_id = %entry.id, "Lease lost before completion, result kept but status not written");
                Ok(Processed::LeaseLost)
            }
            Err(e) => Err(e),
        }
    }

    async fn fail(&self, entry: &EnrichmentQueueEntry, lease: &Lease, cause: &Error) -> Result<Processed> {
        let now = Utc::now();
        let retry_after = match cause {
            Error::TransientExternal { retry_after, .. } => *retry_after,
            _ => None,
        };
        let delay = self.queue.backoff().jittered(entry.retry_count, retry_after);
        let retry_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let report = FailureReport {
            error: cause,
            disposition: disposition(cause),
            max_retries: self.queue.max_retries,
            retry_at,
        };

        match self.stores.queue.mark_failed(entry.id, lease.id, report, now).await {
            Ok(FailOutcome::RetryScheduled {
                retry_count,
                available_at,
            }) => {
                self.metrics.enrichment_retried.inc();
                warn!(
                    tenant_id = %entry.tenant_id,
                    candidate_id = %entry.candidate_id,
                    retry_count,
                    retry_at = %available_at,
                    error = %cause,
                    "Enrichment failed, retry scheduled"
                );
                Ok(Processed::Retrying {
                    retry_count,
                    available_at,
                })
            }
            Ok(FailOutcome::Failed { retry_count }) => {
                self.metrics.enrichment_failed.inc();
                error!(
                    tenant_id = %entry.tenant_id,
                    candidate_id = %entry.candidate_id,
                    retry_count,
                    code = cause.code(),
                    error = %cause,
                    "Enrichment failed terminally"
                );
                Ok(Processed::Failed {
                    retry_count,
                    code: cause.code(),
                })
            }
            Err(Error::LeaseLost { .. }) => {
                warn!(entry_id = %entry.id, error = %cause, "Lease lost before failure could be recorded");
                Ok(Processed::LeaseLost)
            }
            Err(e) => Err(e),
        }
    }

    async fn enrich(&self, entry: &EnrichmentQueueEntry) -> Result<()> {
        let started = Utc::now();
        let candidate = self.source_material(entry).await?;

        let text = candidate.profile.profile_text().ok_or_else(|| {
            Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                format!("candidate {} has no profile source material", candidate.id),
            )
        })?;

        let enrichment = self.analyze(&text).await?;
        let now = Utc::now();
        let retention = self
            .stores
            .tenants
            .get_tenant(&entry.tenant_id)
            .await?
            .ok_or_else(|| Error::not_found("tenant", &entry.tenant_id))?
            .retention;
        let retention_date = retention.retention_date_from(now);

        let mut record = match self
            .stores
            .candidates
            .get_enrichment(&entry.tenant_id, &entry.candidate_id)
            .await?
        {
            Some(mut existing) => {
                existing.reenrich(enrichment, now);
                // Consent was confirmed above; the store refuses the write if
                // it was withdrawn again since `started`.
                existing.restore(now);
                existing.data_retention_date = retention_date;
                existing
            }
            None => CandidateEnrichmentRecord::new(
                entry.tenant_id.clone(),
                entry.candidate_id.clone(),
                enrichment,
                retention_date,
                now,
            ),
        };

        self.score(&mut record, now).await?;
        if self
            .stores
            .candidates
            .upsert_enrichment_if_consented(record, started)
            .await?
        {
            return Ok(());
        }

        self.metrics.consent_refusals.inc();
        warn!(
            tenant_id = %entry.tenant_id,
            candidate_id = %entry.candidate_id,
            "Consent withdrawn during enrichment, result discarded"
        );
        Err(Error::ConsentRequired {
            candidate_id: entry.candidate_id.to_string(),
        })
    }

    /// The candidate with consent checked and source material present.
    async fn source_material(&self, entry: &EnrichmentQueueEntry) -> Result<Candidate> {
        let local = self
            .stores
            .candidates
            .get_candidate(&entry.tenant_id, &entry.candidate_id)
            .await?;

        if let Some(candidate) = &local {
            if !candidate.data_usage_consent {
                self.metrics.consent_refusals.inc();
                return Err(Error::ConsentRequired {
                    candidate_id: candidate.id.to_string(),
                });
            }
        }

        let candidate = match local {
            Some(candidate) if !candidate.profile.is_empty() => candidate,
            _ => {
                let fetched = self.ats.get_candidate(&entry.tenant_id, &entry.candidate_id).await?;
                self.stores.candidates.upsert_candidate(fetched.clone()).await?;
                fetched
            }
        };

        if !candidate.data_usage_consent {
            self.metrics.consent_refusals.inc();
            return Err(Error::ConsentRequired {
                candidate_id: candidate.id.to_string(),
            });
        }
        Ok(candidate)
    }

    async fn analyze(&self, text: &str) -> Result<StructuredEnrichment> {
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.analysis.timeout(), self.analyzer.analyze(text)).await;
            self.metrics.analysis_latency.observe(started.elapsed());

            match outcome {
                Ok(Ok(enrichment)) => return Ok(enrichment),
                Ok(Err(AnalysisError::Malformed(reason))) if attempt < self.analysis.malformed_retries => {
                    attempt += 1;
                    warn!(attempt, reason = %reason, "Malformed analysis response, asking again");
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(Error::transient(
                        "ai_analysis",
                        format!("timed out after {}ms", self.analysis.timeout_ms),
                    ))
                }
            }
        }
    }

    /// Score against the general template plus the tenant's active templates.
    async fn score(&self, record: &mut CandidateEnrichmentRecord, now: DateTime<Utc>) -> Result<()> {
        let general_id = TemplateId::parse(GENERAL_TEMPLATE_ID)?;
        let general = self
            .stores
            .templates
            .get_template(&record.tenant_id, &general_id)
            .await?
            .unwrap_or_else(BenchmarkTemplate::general);

        let mut templates = vec![general];
        templates.extend(
            self.stores
                .templates
                .active_templates(&record.tenant_id)
                .await?
                .into_iter()
                .filter(|t| t.id != general_id),
        );

        for template in &templates {
            let result = self.engine.evaluate(&record.enrichment, template);
            if template.id == general_id {
                record.overall_score = Some(result.overall_score);
                record.tier = Some(result.tier.clone());
            }
            record
                .benchmark_scores
                .insert(template.id.to_string(), BenchmarkEngine::to_stored(&result, now));
            self.stores.templates.mark_referenced(template).await?;
        }
        Ok(())
    }

    /// Run until `shutdown` flips. An in-flight entry finishes before exit.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(worker = %self.id, "Enrichment worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(worker = %self.id, "Enrichment worker error: {}", e),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(worker = %self.id, "Enrichment worker stopped");
    }
}

/// Enqueue with the normal upsert semantics, logging the outcome.
pub async fn enqueue_candidate(
    stores: &Stores,
    tenant: &TenantId,
    candidate: &CandidateId,
    priority: i32,
    mode: EnqueueMode,
    metrics: &Metrics,
) -> Result<EnrichmentQueueEntry> {
    let (entry, outcome) = stores
        .queue
        .enqueue(tenant, candidate, priority, mode, Utc::now())
        .await?;
    metrics.enqueued.inc();
    debug!(
        tenant_id = %tenant,
        candidate_id = %candidate,
        outcome = ?outcome,
        priority = entry.priority,
        "Enqueued candidate for enrichment"
    );
    Ok(entry)
}
