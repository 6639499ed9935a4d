//! Shared test doubles for the worker tests.

use async_trait::async_trait;
use ats_client::{AtsApi, ListQuery, Page, WebhookRegistration};
use chrono::Utc;
use pipeline_core::{
    Candidate, CandidateId, Error, ExperienceArea, Job, JobId, ProfileSource, Result, Secret, SkillAssessment,
    StructuredEnrichment, Tenant, TenantId,
};

use crate::analyzer::{AnalysisError, Analyzer};

pub fn tenant() -> TenantId {
    TenantId::parse("acme").unwrap()
}

pub fn tenant_record() -> Tenant {
    Tenant::new(tenant(), "Acme", Secret::new("whsec"))
}

pub fn consenting_candidate(id: &str) -> Candidate {
    Candidate {
        tenant_id: tenant(),
        id: CandidateId::parse(id).unwrap(),
        display_name: Some("Ada".into()),
        email: None,
        profile: ProfileSource {
            resume_text: Some("Ten years of Rust".into()),
            ..Default::default()
        },
        data_usage_consent: true,
        updated_at: Utc::now(),
    }
}

pub fn sample_enrichment() -> StructuredEnrichment {
    StructuredEnrichment {
        skills: vec![SkillAssessment {
            name: "communication".into(),
            level: 3.0,
        }],
        experience: vec![ExperienceArea {
            area: "professional".into(),
            years: 5.0,
        }],
        traits: vec!["curious".into()],
        summary: "Backend engineer".into(),
    }
}

/// Always answers with [`sample_enrichment`].
pub struct FixedAnalyzer;

#[async_trait]
impl Analyzer for FixedAnalyzer {
    async fn analyze(&self, _profile_text: &str) -> std::result::Result<StructuredEnrichment, AnalysisError> {
        Ok(sample_enrichment())
    }
}

/// An ATS that has nothing.
pub struct NoAts;

#[async_trait]
impl AtsApi for NoAts {
    async fn get_candidate(&self, _tenant: &TenantId, id: &CandidateId) -> Result<Candidate> {
        Err(Error::not_found("candidate", id))
    }

    async fn get_job(&self, _tenant: &TenantId, id: &JobId) -> Result<Job> {
        Err(Error::not_found("job", id))
    }

    async fn list_candidates(&self, _tenant: &TenantId, _query: &ListQuery) -> Result<Page<Candidate>> {
        Ok(Page {
            items: vec![],
            next_cursor: None,
        })
    }

    async fn list_jobs(&self, _tenant: &TenantId, _query: &ListQuery) -> Result<Page<Job>> {
        Ok(Page {
            items: vec![],
            next_cursor: None,
        })
    }

    async fn register_webhook(
        &self,
        _tenant: &TenantId,
        _callback_url: &url::Url,
        _events: &[String],
    ) -> Result<WebhookRegistration> {
        Err(Error::internal("webhook registration not available"))
    }
}
