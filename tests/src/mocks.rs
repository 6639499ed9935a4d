//! Mock collaborators for testing.
//!
//! Each mock implements the same trait the production collaborator does,
//! so the router and the workers run their real code paths against them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ats_client::{AtsApi, ListQuery, Page, TokenExchange, WebhookRegistration};
use parking_lot::Mutex;
use pipeline_core::{
    Candidate, CandidateId, Error, Job, JobId, Result, Secret, StructuredEnrichment, TenantId, TokenSet,
};
use worker::{AnalysisError, Analyzer, Notification, Notifier};

use crate::fixtures;

/// Analyzer that plays back scripted replies, then answers with the
/// sample enrichment.
#[derive(Default)]
pub struct MockAnalyzer {
    replies: Mutex<VecDeque<std::result::Result<StructuredEnrichment, AnalysisError>>>,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for the next call.
    pub fn push(&self, reply: std::result::Result<StructuredEnrichment, AnalysisError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _profile_text: &str) -> std::result::Result<StructuredEnrichment, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(fixtures::enrichment()))
    }
}

/// Notifier that captures everything it is asked to send.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
    should_fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::transient("notifications", "simulated outage"));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// In-memory ATS. Lists return everything in pages of `page_size`.
pub struct MockAtsApi {
    candidates: Mutex<BTreeMap<(TenantId, CandidateId), Candidate>>,
    jobs: Mutex<BTreeMap<(TenantId, JobId), Job>>,
    page_size: usize,
    list_calls: AtomicUsize,
}

impl MockAtsApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            candidates: Mutex::new(BTreeMap::new()),
            jobs: Mutex::new(BTreeMap::new()),
            page_size: 2,
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_candidate(&self, candidate: Candidate) {
        self.candidates
            .lock()
            .insert((candidate.tenant_id.clone(), candidate.id.clone()), candidate);
    }

    pub fn add_job(&self, job: Job) {
        self.jobs.lock().insert((job.tenant_id.clone(), job.id.clone()), job);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(&self, items: Vec<T>, query: &ListQuery) -> Result<Page<T>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let start: usize = match &query.cursor {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| Error::permanent("ats", "bad cursor", Some(400)))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        Ok(Page {
            items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
            next_cursor: (end < items.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl AtsApi for MockAtsApi {
    async fn get_candidate(&self, tenant: &TenantId, id: &CandidateId) -> Result<Candidate> {
        self.candidates
            .lock()
            .get(&(tenant.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found("candidate", id))
    }

    async fn get_job(&self, tenant: &TenantId, id: &JobId) -> Result<Job> {
        self.jobs
            .lock()
            .get(&(tenant.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found("job", id))
    }

    async fn list_candidates(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Candidate>> {
        let items = self
            .candidates
            .lock()
            .values()
            .filter(|c| &c.tenant_id == tenant)
            .filter(|c| query.updated_since.map_or(true, |since| c.updated_at > since))
            .cloned()
            .collect();
        self.page(items, query)
    }

    async fn list_jobs(&self, tenant: &TenantId, query: &ListQuery) -> Result<Page<Job>> {
        let items = self
            .jobs
            .lock()
            .values()
            .filter(|j| &j.tenant_id == tenant)
            .filter(|j| query.updated_since.map_or(true, |since| j.updated_at > since))
            .cloned()
            .collect();
        self.page(items, query)
    }

    async fn register_webhook(
        &self,
        tenant: &TenantId,
        callback_url: &url::Url,
        events: &[String],
    ) -> Result<WebhookRegistration> {
        Ok(WebhookRegistration {
            id: format!("hook-{tenant}"),
            callback_url: callback_url.clone(),
            events: events.to_vec(),
        })
    }
}

/// Token exchange that counts refreshes and can be told to reject them.
#[derive(Default)]
pub struct MockTokenExchange {
    refreshes: AtomicUsize,
    reject: AtomicBool,
}

impl MockTokenExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for MockTokenExchange {
    async fn refresh(&self, _tenant: &TenantId, _refresh_token: &Secret) -> Result<TokenSet> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::permanent("ats", "invalid_grant", Some(400)));
        }
        Ok(fixtures::token_set(chrono::Duration::hours(1)))
    }
}
