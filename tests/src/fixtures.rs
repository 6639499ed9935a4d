//! Test fixtures for building tenants, ATS records and webhook bodies.

use chrono::{DateTime, Duration, Utc};
use pipeline_core::{
    Candidate, CandidateId, ExperienceArea, Job, JobId, JobState, ProfileSource, Secret, SkillAssessment,
    StructuredEnrichment, Tenant, TenantId, TokenSet,
};
use serde_json::{json, Value};

/// Webhook secret every fixture tenant signs with.
pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub fn tenant_id() -> TenantId {
    TenantId::parse("acme").expect("valid tenant id")
}

pub fn tenant() -> Tenant {
    Tenant::new(tenant_id(), "Acme Corp", Secret::new(WEBHOOK_SECRET))
}

pub fn candidate(id: &str, consent: bool) -> Candidate {
    Candidate {
        tenant_id: tenant_id(),
        id: CandidateId::parse(id).expect("valid candidate id"),
        display_name: Some("Grace Hopper".into()),
        email: Some("grace@example.com".into()),
        profile: ProfileSource {
            resume_text: Some("Compiler engineer, twelve years, led teams of eight".into()),
            ..Default::default()
        },
        data_usage_consent: consent,
        updated_at: Utc::now(),
    }
}

pub fn job(id: &str) -> Job {
    Job {
        tenant_id: tenant_id(),
        id: JobId::parse(id).expect("valid job id"),
        title: "Staff Engineer".into(),
        state: JobState::Open,
        updated_at: Utc::now(),
    }
}

/// Analysis output that scores in the top tier of the general template.
pub fn enrichment() -> StructuredEnrichment {
    let skill = |name: &str, level: f64| SkillAssessment {
        name: name.into(),
        level,
    };
    StructuredEnrichment {
        skills: vec![
            skill("communication", 4.0),
            skill("problem solving", 5.0),
            skill("teamwork", 3.5),
            skill("leadership", 3.0),
            skill("JS", 3.0),
        ],
        experience: vec![ExperienceArea {
            area: "professional".into(),
            years: 12.0,
        }],
        traits: vec!["curious".into()],
        summary: "Compiler engineer".into(),
    }
}

pub fn token_set(valid_for: Duration) -> TokenSet {
    TokenSet {
        access_token: Secret::new("access"),
        refresh_token: Secret::new("refresh"),
        expires_at: Utc::now() + valid_for,
    }
}

/// Webhook envelope for `event_type` with `data`.
pub fn webhook(event_id: Option<&str>, event_type: &str, timestamp: DateTime<Utc>, data: Value) -> Vec<u8> {
    let mut body = json!({
        "type": event_type,
        "tenantId": tenant_id(),
        "timestamp": timestamp,
        "data": data,
    });
    if let Some(id) = event_id {
        body["id"] = json!(id);
    }
    serde_json::to_vec(&body).expect("serializable webhook")
}

pub fn candidate_webhook(event_id: &str, candidate: &str, consent: bool) -> Vec<u8> {
    webhook(
        Some(event_id),
        "candidate.updated",
        Utc::now(),
        json!({
            "id": candidate,
            "displayName": "Grace Hopper",
            "resumeText": "Compiler engineer, twelve years, led teams of eight",
            "dataUsageConsent": consent,
        }),
    )
}

pub fn application_webhook(
    event_id: &str,
    event_type: &str,
    session: &str,
    timestamp: DateTime<Utc>,
    email: Option<&str>,
) -> Vec<u8> {
    let mut data = json!({"jobId": "j1", "sessionId": session, "candidateId": "c1"});
    if let Some(email) = email {
        data["contact"] = json!({"email": email, "name": "Grace"});
    }
    webhook(Some(event_id), event_type, timestamp, data)
}

/// Signature header value for `body` under the fixture secret.
pub fn signature(body: &[u8]) -> String {
    api::sign(WEBHOOK_SECRET.as_bytes(), body).expect("hmac accepts any key length")
}

/// Template body weighting a single JS skill at 0.5.
pub fn js_template(version: u32) -> Value {
    json!({
        "name": "Frontend",
        "version": version,
        "skillWeights": [{"skillName": "JS", "weight": 0.5, "minimumLevel": 3}],
        "scoringRules": {
            "tieringThresholds": [
                {"tier": "strong", "minScore": 90},
                {"tier": "maybe", "minScore": 0}
            ]
        }
    })
}
