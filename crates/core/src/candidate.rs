//! Candidate, job and enrichment record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::benchmark::Tier;
use crate::ids::{CandidateId, JobId, TenantId};
use crate::limits::{truncate_chars, MAX_PROFILE_TEXT_CHARS};

/// Structured profile as supplied by the ATS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredProfile {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub years: Option<f64>,
}

/// Source material the analysis service works from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSource {
    #[serde(default)]
    pub resume_text: Option<String>,
    #[serde(default)]
    pub resume_url: Option<Url>,
    #[serde(default)]
    pub structured: Option<StructuredProfile>,
}

impl ProfileSource {
    pub fn is_empty(&self) -> bool {
        self.resume_text.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.resume_url.is_none()
            && self.structured.is_none()
    }

    /// Render the source into the text handed to the analysis service.
    ///
    /// Resume text wins; otherwise the structured profile is flattened and
    /// the resume URL is appended for the collaborator to fetch.
    pub fn profile_text(&self) -> Option<String> {
        if let Some(text) = self.resume_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(truncate_chars(text, MAX_PROFILE_TEXT_CHARS).to_string());
        }

        let mut lines = Vec::new();
        if let Some(profile) = &self.structured {
            if let Some(headline) = &profile.headline {
                lines.push(headline.clone());
            }
            for position in &profile.positions {
                let mut line = position.title.clone();
                if let Some(company) = &position.company {
                    line.push_str(" at ");
                    line.push_str(company);
                }
                if let Some(years) = position.years {
                    line.push_str(&format!(" ({years} years)"));
                }
                lines.push(line);
            }
            if !profile.skills.is_empty() {
                lines.push(format!("Skills: {}", profile.skills.join(", ")));
            }
        }
        if let Some(url) = &self.resume_url {
            lines.push(format!("Resume: {url}"));
        }

        if lines.is_empty() {
            None
        } else {
            Some(truncate_chars(&lines.join("\n"), MAX_PROFILE_TEXT_CHARS).to_string())
        }
    }
}

/// Candidate as mirrored from the ATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub tenant_id: TenantId,
    pub id: CandidateId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile: ProfileSource,
    /// Privacy gate read by the enrichment worker.
    pub data_usage_consent: bool,
    pub updated_at: DateTime<Utc>,
}

/// Job lifecycle state in the ATS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Open,
    Closed,
    Draft,
    #[serde(other)]
    Unknown,
}

/// Job (requisition) as mirrored from the ATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub tenant_id: TenantId,
    pub id: JobId,
    pub title: String,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

/// A single skill assessed by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SkillAssessment {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Proficiency on the 0-5 scale
    #[validate(range(min = 0.0, max = 5.0))]
    pub level: f64,
}

/// Experience in a domain, in years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceArea {
    #[validate(length(min = 1, max = 100))]
    pub area: String,
    #[validate(range(min = 0.0, max = 80.0))]
    pub years: f64,
}

/// Structured output of the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StructuredEnrichment {
    #[validate(length(max = 200))]
    #[validate(nested)]
    #[serde(default)]
    pub skills: Vec<SkillAssessment>,
    #[validate(length(max = 100))]
    #[validate(nested)]
    #[serde(default)]
    pub experience: Vec<ExperienceArea>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub summary: String,
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl StructuredEnrichment {
    /// Observed level of a skill. Missing skills count as 0.
    pub fn skill_level(&self, name: &str) -> f64 {
        let key = normalize_key(name);
        self.skills
            .iter()
            .filter(|s| normalize_key(&s.name) == key)
            .map(|s| s.level)
            .fold(0.0, f64::max)
    }

    /// Years of experience in an area. Missing areas count as 0.
    pub fn experience_years(&self, area: &str) -> f64 {
        let key = normalize_key(area);
        self.experience
            .iter()
            .filter(|e| normalize_key(&e.area) == key)
            .map(|e| e.years)
            .fold(0.0, f64::max)
    }
}

/// Score of a record against one template, as persisted on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredScore {
    pub template_version: u32,
    pub overall_score: f64,
    pub tier: Tier,
    pub scored_at: DateTime<Utc>,
}

/// Why a record was logically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    RetentionExpired,
    ConsentWithdrawn,
}

/// AI-derived attributes and scores for one candidate in one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEnrichmentRecord {
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    pub enrichment: StructuredEnrichment,
    /// Scores keyed by template id.
    pub benchmark_scores: BTreeMap<String, StoredScore>,
    pub overall_score: Option<f64>,
    pub tier: Option<Tier>,
    pub data_usage_consent: bool,
    pub data_retention_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<DeletionReason>,
}

impl CandidateEnrichmentRecord {
    /// Creates a record on first successful enrichment.
    pub fn new(
        tenant_id: TenantId,
        candidate_id: CandidateId,
        enrichment: StructuredEnrichment,
        data_retention_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            candidate_id,
            enrichment,
            benchmark_scores: BTreeMap::new(),
            overall_score: None,
            tier: None,
            data_usage_consent: true,
            data_retention_date,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deletion_reason: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the record has outlived its retention date.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.data_retention_date <= now
    }

    /// Replace the AI-derived fields on re-enrichment. Consent and deletion
    /// state are left alone.
    pub fn reenrich(&mut self, enrichment: StructuredEnrichment, now: DateTime<Utc>) {
        self.enrichment = enrichment;
        self.benchmark_scores.clear();
        self.overall_score = None;
        self.tier = None;
        self.updated_at = now;
    }

    /// Bring a logically deleted record back after the candidate consented
    /// again. Callers must have checked the candidate's current consent.
    pub fn restore(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_some() {
            self.data_usage_consent = true;
            self.deleted_at = None;
            self.deletion_reason = None;
            self.updated_at = now;
        }
    }

    /// Whether consent was withdrawn at or after `since`.
    pub fn consent_withdrawn_since(&self, since: DateTime<Utc>) -> bool {
        self.deletion_reason == Some(DeletionReason::ConsentWithdrawn)
            && self.deleted_at.is_some_and(|at| at >= since)
    }

    pub fn logically_delete(&mut self, reason: DeletionReason, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
            self.deletion_reason = Some(reason);
            if reason == DeletionReason::ConsentWithdrawn {
                self.data_usage_consent = false;
            }
            self.updated_at = now;
        }
    }
}
