//! Webhook ingress.
//!
//! Deliveries are at-least-once, so every accepted webhook is keyed (the
//! ATS event id, else a digest of body and timestamp) and a key seen within
//! the dedup window is acknowledged without side effects. Signature checks
//! happen before anything is parsed; a rejected delivery changes nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hmac::{Hmac, Mac};
use moka::future::Cache;
use pipeline_core::limits::{MAX_WEBHOOK_PAYLOAD_BYTES, WEBHOOK_SIGNATURE_PREFIX};
use pipeline_core::{
    DeletionReason, EnqueueMode, Error, NormalizedWebhook, Result, TenantId, ValidationErrorCode, WebhookEnvelope,
};
use pipeline_store::Stores;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;
use worker::{enqueue_candidate, QueueConfig};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// How long a handled delivery key is remembered (s)
    pub dedup_window_secs: u64,
    /// Maximum remembered keys
    pub dedup_capacity: u64,
    /// Largest accepted body (bytes)
    pub max_payload_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 86_400,
            dedup_capacity: 100_000,
            max_payload_bytes: MAX_WEBHOOK_PAYLOAD_BYTES,
        }
    }
}

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WebhookOutcome {
    Accepted {
        dedup_key: String,
        event_id: Option<Uuid>,
        enqueued: bool,
    },
    /// Already handled within the dedup window.
    Duplicate { dedup_key: String },
    /// Verified, but of a type this pipeline does not act on.
    Ignored { event_type: String },
}

pub struct WebhookIngress {
    stores: Stores,
    queue: QueueConfig,
    config: WebhookConfig,
    seen: Cache<String, ()>,
    metrics: Arc<Metrics>,
}

impl WebhookIngress {
    pub fn new(stores: Stores, queue: QueueConfig, config: WebhookConfig, metrics: Arc<Metrics>) -> Self {
        let seen = Cache::builder()
            .max_capacity(config.dedup_capacity)
            .time_to_live(Duration::from_secs(config.dedup_window_secs))
            .build();
        Self {
            stores,
            queue,
            config,
            seen,
            metrics,
        }
    }

    /// Verify, dedup and apply one delivery for `tenant`.
    pub async fn handle(&self, tenant: &TenantId, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let start = Instant::now();
        self.metrics.webhooks_received.inc();

        let result = self.handle_inner(tenant, body, signature).await;
        match &result {
            Ok(WebhookOutcome::Duplicate { dedup_key }) => {
                self.metrics.webhooks_duplicate.inc();
                debug!(tenant_id = %tenant, dedup_key = %dedup_key, "Duplicate webhook delivery ignored");
            }
            Ok(_) => {}
            Err(e @ Error::InvalidSignature(_)) => {
                self.metrics.webhooks_rejected.inc();
                warn!(tenant_id = %tenant, "Webhook rejected: {}", e);
            }
            Err(e) => {
                self.metrics.webhooks_rejected.inc();
                warn!(tenant_id = %tenant, code = e.code(), "Webhook failed: {}", e);
            }
        }
        self.metrics.webhook_latency.observe(start.elapsed());
        result
    }

    async fn handle_inner(&self, tenant: &TenantId, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        if body.len() > self.config.max_payload_bytes {
            return Err(Error::validation_code(
                ValidationErrorCode::PayloadTooLarge,
                format!(
                    "payload size {}KB exceeds {}KB limit",
                    body.len() / 1024,
                    self.config.max_payload_bytes / 1024
                ),
            ));
        }

        // Unknown and inactive tenants are indistinguishable from a bad signature.
        let secret = match self.stores.tenants.get_tenant(tenant).await? {
            Some(t) if t.active => t.webhook_secret,
            _ => return Err(Error::InvalidSignature(format!("no webhook secret for tenant {tenant}"))),
        };
        verify_signature(secret.expose().as_bytes(), body, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(body).map_err(|e| {
            Error::validation_code(ValidationErrorCode::InvalidFormat, format!("invalid webhook body: {e}"))
        })?;
        if &envelope.tenant_id != tenant {
            return Err(Error::validation(format!(
                "webhook for tenant {} delivered to tenant {tenant}",
                envelope.tenant_id
            )));
        }

        let dedup_key = dedup_key(tenant, &envelope, body);
        let fresh = self.seen.entry(dedup_key.clone()).or_insert(()).await.is_fresh();
        if !fresh {
            return Ok(WebhookOutcome::Duplicate { dedup_key });
        }

        match self.apply(tenant, &envelope, dedup_key.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Let the ATS redelivery through.
                self.seen.invalidate(&dedup_key).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, tenant: &TenantId, envelope: &WebhookEnvelope, dedup_key: String) -> Result<WebhookOutcome> {
        let now = Utc::now();
        let normalized = envelope.normalize()?;
        let event = normalized.to_event(tenant, envelope.timestamp)?;
        let mut enqueued = false;

        match normalized {
            NormalizedWebhook::Ignored(event_type) => {
                debug!(tenant_id = %tenant, event_type = %event_type, "Ignoring webhook type");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
            NormalizedWebhook::Job { job, .. } => {
                self.stores.candidates.upsert_job(job.into_job(tenant.clone(), now)).await?;
            }
            NormalizedWebhook::Candidate { candidate, .. } => {
                let id = candidate.id.clone();
                let withdraws = candidate.withdraws_consent();
                let existing = self.stores.candidates.get_candidate(tenant, &id).await?;
                let merged = candidate.into_candidate(tenant.clone(), existing.as_ref(), now);
                self.stores.candidates.upsert_candidate(merged).await?;

                if withdraws {
                    let deleted = self
                        .stores
                        .candidates
                        .logically_delete_enrichment(tenant, &id, DeletionReason::ConsentWithdrawn, now)
                        .await?;
                    info!(
                        tenant_id = %tenant,
                        candidate_id = %id,
                        record_deleted = deleted,
                        "Data-usage consent withdrawn"
                    );
                } else {
                    enqueue_candidate(
                        &self.stores,
                        tenant,
                        &id,
                        self.queue.webhook_priority,
                        EnqueueMode::Normal,
                        &self.metrics,
                    )
                    .await?;
                    enqueued = true;
                }
            }
            NormalizedWebhook::Application { .. } => {}
        }

        let event_id = match event {
            Some(event) => {
                let id = event.id;
                self.stores.events.append(event).await?;
                Some(id)
            }
            None => None,
        };

        info!(
            tenant_id = %tenant,
            event_type = %envelope.event_type,
            dedup_key = %dedup_key,
            enqueued,
            "Webhook accepted"
        );
        Ok(WebhookOutcome::Accepted {
            dedup_key,
            event_id,
            enqueued,
        })
    }
}

/// Check `sha256=<hex>` against the HMAC of `body`. The comparison is
/// constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<()> {
    let header = header.ok_or_else(|| Error::InvalidSignature("missing signature header".into()))?;
    let hex_digest = header
        .trim()
        .strip_prefix(WEBHOOK_SIGNATURE_PREFIX)
        .ok_or_else(|| Error::InvalidSignature("unsupported signature scheme".into()))?;
    let expected = hex::decode(hex_digest).map_err(|_| Error::InvalidSignature("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::internal(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| Error::InvalidSignature("signature mismatch".into()))
}

/// `sha256=<hex>` signature header value for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::internal(e.to_string()))?;
    mac.update(body);
    Ok(format!("{WEBHOOK_SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

fn dedup_key(tenant: &TenantId, envelope: &WebhookEnvelope, body: &[u8]) -> String {
    match envelope.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => format!("{tenant}:id:{id}"),
        None => {
            let mut hasher = Sha256::new();
            hasher.update(body);
            hasher.update(envelope.timestamp.to_rfc3339().as_bytes());
            format!("{tenant}:sha256:{}", hex::encode(hasher.finalize()))
        }
    }
}
