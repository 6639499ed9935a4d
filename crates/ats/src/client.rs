//! Rate-limit-aware ATS client.
//!
//! Every call goes through [`AtsClient::execute`]: per-tenant concurrency
//! cap, per-tenant circuit breaker, per-request timeout, and exponential
//! backoff with jitter on transient failures.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_core::{Candidate, CandidateId, Error, Job, JobId, Result, Secret, TenantId};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use telemetry::Metrics;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::circuit::CircuitBreaker;
use crate::config::AtsConfig;
use crate::token::TokenManager;
use crate::wire::{AtsCandidate, AtsJob, ListQuery, Page, WebhookRegistration, WebhookRegistrationRequest};

const SERVICE: &str = "ats";

/// Typed ATS operations, scoped by tenant.
#[async_trait]
pub trait AtsApi: Send + Sync {
    async fn get_candidate(&self, tenant: &TenantId, id: &CandidateId) -> Result<Candidate>;

    async fn get_job(&self, tenant: &TenantId, id: &JobId) -> Result<Job>;

    async fn list_candidates(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Candidate>>;

    async fn list_jobs(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Job>>;

    /// Register the callback URL the ATS delivers webhooks to.
    async fn register_webhook(
        &self,
        tenant: &TenantId,
        callback_url: &Url,
        events: &[String],
    ) -> Result<WebhookRegistration>;
}

/// Map an HTTP status onto the transient/permanent split.
pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> Error {
    let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    if status == 429 || status >= 500 {
        Error::TransientExternal {
            service: SERVICE,
            message,
            retry_after,
        }
    } else {
        Error::permanent(SERVICE, message, Some(status))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn is_unauthorized(error: &Error) -> bool {
    matches!(error, Error::PermanentExternal { status: Some(401), .. })
}

async fn decode<T: DeserializeOwned>(sent: reqwest::Result<reqwest::Response>) -> Result<T> {
    let response = sent.map_err(|e| Error::transient(SERVICE, e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                Error::permanent(SERVICE, format!("malformed payload: {e}"), None)
            } else {
                Error::transient(SERVICE, e.to_string())
            }
        });
    }
    let wait = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status.as_u16(), wait, &body))
}

pub struct AtsClient {
    config: AtsConfig,
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    backoff: Backoff,
    metrics: Arc<Metrics>,
    limiters: Mutex<HashMap<TenantId, Arc<Semaphore>>>,
    breakers: Mutex<HashMap<TenantId, Arc<CircuitBreaker>>>,
}

impl AtsClient {
    pub fn new(config: AtsConfig, http: reqwest::Client, tokens: Arc<TokenManager>, metrics: Arc<Metrics>) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        );
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
            http,
            tokens,
            backoff,
            metrics,
            limiters: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn limiter(&self, tenant: &TenantId) -> Arc<Semaphore> {
        self.limiters
            .lock()
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrency_per_tenant.max(1))))
            .clone()
    }

    fn breaker(&self, tenant: &TenantId) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(tenant.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.config.circuit_failure_threshold,
                    self.config.circuit_cooldown(),
                ))
            })
            .clone()
    }

    /// Run `call` with a valid token under the tenant's resource limits,
    /// retrying transient failures with backoff.
    pub async fn execute<T, F, Fut>(&self, tenant: &TenantId, operation: &str, call: F) -> Result<T>
    where
        F: Fn(Secret) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let limiter = self.limiter(tenant);
        let breaker = self.breaker(tenant);
        let mut attempt = 0;
        let mut reauthorized = false;

        loop {
            let token = self.tokens.get_access_token(tenant).await?;
            let outcome = self.attempt(&limiter, &breaker, &call, token.clone()).await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if is_unauthorized(&e) && !reauthorized => {
                    debug!(tenant_id = %tenant, operation, "ATS rejected access token, refreshing");
                    reauthorized = true;
                    self.tokens.refresh_rejected(tenant, &token).await?;
                }
                Err(e) if e.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let floor = match &e {
                        Error::TransientExternal { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    if floor.is_some_and(|floor| floor > self.backoff.cap) {
                        // Too long to wait in-line; the caller's retry path takes it.
                        debug!(tenant_id = %tenant, operation, ?floor, "Retry-After exceeds backoff cap, giving up");
                        return Err(e);
                    }
                    let delay = self.backoff.jittered(attempt, floor);
                    warn!(
                        tenant_id = %tenant,
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient ATS failure, backing off"
                    );
                    self.metrics.ats_retries.inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        limiter: &Arc<Semaphore>,
        breaker: &CircuitBreaker,
        call: &F,
        token: Secret,
    ) -> Result<T>
    where
        F: Fn(Secret) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let _permit = match tokio::time::timeout(self.config.acquire_timeout(), limiter.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::internal("ATS concurrency limiter closed")),
            Err(_) => return Err(Error::transient(SERVICE, "timed out waiting for a tenant concurrency slot")),
        };

        // Dropping the permit mid-call re-opens a half-open circuit.
        let Some(permit) = breaker.try_acquire() else {
            self.metrics.ats_circuit_rejections.inc();
            return Err(Error::transient(SERVICE, "circuit open"));
        };

        self.metrics.ats_requests.inc();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.config.request_timeout(), call(token)).await {
            Ok(result) => result,
            Err(_) => Err(Error::transient(SERVICE, "request timed out")),
        };
        self.metrics.ats_latency.observe(started.elapsed());

        match &outcome {
            Err(e) if e.is_transient() => {
                if permit.fail() {
                    warn!(error = %e, "ATS circuit opened");
                }
            }
            _ => permit.succeed(),
        }
        outcome
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T>(&self, tenant: &TenantId, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let url = self.url(path);
        self.execute(tenant, path, |token| {
            let request = self.http.get(&url).bearer_auth(token.expose()).query(query);
            async move { decode(request.send().await).await }
        })
        .await
    }

    fn list_params(&self, query: &ListQuery) -> Vec<(&'static str, String)> {
        let limit = if query.limit == 0 { self.config.page_size } else { query.limit };
        let mut params = vec![("limit", limit.to_string())];
        if let Some(since) = query.updated_since {
            params.push(("updatedSince", since.to_rfc3339()));
        }
        if let Some(cursor) = &query.cursor {
            params.push(("cursor", cursor.clone()));
        }
        params
    }
}

#[async_trait]
impl AtsApi for AtsClient {
    async fn get_candidate(&self, tenant: &TenantId, id: &CandidateId) -> Result<Candidate> {
        let candidate: AtsCandidate = self.get_json(tenant, &format!("candidates/{id}"), &[]).await?;
        Ok(candidate.into_candidate(tenant.clone()))
    }

    async fn get_job(&self, tenant: &TenantId, id: &JobId) -> Result<Job> {
        let job: AtsJob = self.get_json(tenant, &format!("jobs/{id}"), &[]).await?;
        Ok(job.into_job(tenant.clone()))
    }

    async fn list_candidates(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Candidate>> {
        let page: Page<AtsCandidate> = self.get_json(tenant, "candidates", &self.list_params(query)).await?;
        Ok(Page {
            items: page.items.into_iter().map(|c| c.into_candidate(tenant.clone())).collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn list_jobs(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Job>> {
        let page: Page<AtsJob> = self.get_json(tenant, "jobs", &self.list_params(query)).await?;
        Ok(Page {
            items: page.items.into_iter().map(|j| j.into_job(tenant.clone())).collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn register_webhook(
        &self,
        tenant: &TenantId,
        callback_url: &Url,
        events: &[String],
    ) -> Result<WebhookRegistration> {
        let url = self.url("webhooks");
        let body = WebhookRegistrationRequest {
            callback_url: callback_url.clone(),
            events: events.to_vec(),
        };
        self.execute(tenant, "webhooks", |token| {
            let request = self.http.post(&url).bearer_auth(token.expose()).json(&body);
            async move { decode(request.send().await).await }
        })
        .await
    }
}
