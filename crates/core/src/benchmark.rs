//! Benchmark template schema and scoring result types.
//!
//! `scoringRules` and `customFormulas` are tagged enums with a fixed schema,
//! validated on write through [`BenchmarkTemplate::validate_schema`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};
use crate::ids::{TemplateId, TenantId};
use crate::queue::QueueStatus;

/// Id of the system-default template used when no template is requested.
pub const GENERAL_TEMPLATE_ID: &str = "general";

/// Coarse classification derived from the overall score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scoring categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Skills,
    Experience,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SkillWeight {
    #[validate(length(min = 1, max = 100))]
    pub skill_name: String,
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub weight: f64,
    /// Required level on the 0-5 scale
    #[validate(range(exclusive_min = 0.0, max = 5.0))]
    pub minimum_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceWeight {
    #[validate(length(min = 1, max = 100))]
    pub area: String,
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub weight: f64,
    #[validate(range(exclusive_min = 0.0, max = 50.0))]
    pub minimum_years: f64,
}

/// Inclusive lower bound for a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TierThreshold {
    pub tier: Tier,
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_score: f64,
}

/// Per-category override hook, applied to the normalized category score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaRule {
    /// Multiply the score.
    Scale { factor: f64 },
    /// Add (or subtract) points.
    Offset { points: f64 },
    /// Bound the score.
    Clamp { min: f64, max: f64 },
    /// Replace the score.
    Fixed { score: f64 },
}

impl FormulaRule {
    pub fn apply(&self, score: f64) -> f64 {
        match *self {
            Self::Scale { factor } => score * factor,
            Self::Offset { points } => score + points,
            Self::Clamp { min, max } => score.clamp(min, max),
            Self::Fixed { score } => score,
        }
    }

    fn check(&self) -> Result<()> {
        let finite = match *self {
            Self::Scale { factor } => factor.is_finite() && factor >= 0.0,
            Self::Offset { points } => points.is_finite(),
            Self::Clamp { min, max } => min.is_finite() && max.is_finite() && min <= max,
            Self::Fixed { score } => (0.0..=100.0).contains(&score),
        };
        if finite {
            Ok(())
        } else {
            Err(Error::validation(format!("invalid custom formula: {self:?}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFormula {
    pub category: ScoreCategory,
    pub rule: FormulaRule,
}

fn default_level_cap() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRules {
    /// Cap on observed/required ratios; above 1.0 rewards exceeding requirements.
    #[serde(default = "default_level_cap")]
    #[validate(range(min = 1.0, max = 3.0))]
    pub level_cap: f64,
    /// Empty means the global default thresholds apply.
    #[serde(default)]
    #[validate(nested)]
    pub tiering_thresholds: Vec<TierThreshold>,
    #[serde(default)]
    pub custom_formulas: Vec<CustomFormula>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            level_cap: default_level_cap(),
            tiering_thresholds: Vec::new(),
            custom_formulas: Vec::new(),
        }
    }
}

/// Global fallback thresholds: >= 85 A, >= 70 B, else C.
pub fn default_tier_thresholds() -> Vec<TierThreshold> {
    vec![
        TierThreshold { tier: Tier::new("A"), min_score: 85.0 },
        TierThreshold { tier: Tier::new("B"), min_score: 70.0 },
        TierThreshold { tier: Tier::new("C"), min_score: 0.0 },
    ]
}

/// Tenant-configurable weighted rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkTemplate {
    pub id: TemplateId,
    /// Owner; `None` for system templates.
    pub tenant_id: Option<TenantId>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub version: u32,
    /// Shared with every tenant.
    #[serde(default)]
    pub is_public: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    #[validate(nested)]
    pub skill_weights: Vec<SkillWeight>,
    #[serde(default)]
    #[validate(nested)]
    pub experience_weights: Vec<ExperienceWeight>,
    #[serde(default)]
    #[validate(nested)]
    pub scoring_rules: ScoringRules,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl BenchmarkTemplate {
    /// Full write-time validation: field ranges plus cross-field rules.
    pub fn validate_schema(&self) -> Result<()> {
        self.validate()?;

        if self.skill_weights.is_empty() && self.experience_weights.is_empty() {
            return Err(Error::validation("template needs at least one weight"));
        }

        let mut seen = HashSet::new();
        for weight in &self.skill_weights {
            if !seen.insert(weight.skill_name.trim().to_lowercase()) {
                return Err(Error::validation(format!(
                    "duplicate skill weight: {}",
                    weight.skill_name
                )));
            }
        }
        seen.clear();
        for weight in &self.experience_weights {
            if !seen.insert(weight.area.trim().to_lowercase()) {
                return Err(Error::validation(format!(
                    "duplicate experience weight: {}",
                    weight.area
                )));
            }
        }

        let mut tiers = HashSet::new();
        for threshold in &self.scoring_rules.tiering_thresholds {
            if !tiers.insert(threshold.tier.as_str()) {
                return Err(Error::validation(format!("duplicate tier: {}", threshold.tier)));
            }
        }

        for formula in &self.scoring_rules.custom_formulas {
            formula.rule.check()?;
        }

        Ok(())
    }

    /// Whether `tenant` may score against this template.
    pub fn visible_to(&self, tenant: &TenantId) -> bool {
        self.is_public || self.tenant_id.is_none() || self.tenant_id.as_ref() == Some(tenant)
    }

    /// Thresholds sorted by descending lower bound. Template thresholds are
    /// authoritative; the global default only fills in when none are defined.
    pub fn effective_thresholds(&self) -> Vec<TierThreshold> {
        let mut thresholds = if self.scoring_rules.tiering_thresholds.is_empty() {
            default_tier_thresholds()
        } else {
            self.scoring_rules.tiering_thresholds.clone()
        };
        thresholds.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        thresholds
    }

    /// The system-default "general" template.
    ///
    /// Fixed constants, not user-editable:
    /// - skills: communication 0.25, problem solving 0.25, teamwork 0.20,
    ///   leadership 0.10, each required at level 3
    /// - experience: professional 0.20, 5 years required
    /// - level cap 1.0, default A/B/C thresholds
    pub fn general() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let skill = |name: &str, weight: f64| SkillWeight {
            skill_name: name.to_string(),
            weight,
            minimum_level: 3.0,
        };
        Self {
            id: TemplateId::parse(GENERAL_TEMPLATE_ID).expect("valid general template id"),
            tenant_id: None,
            name: "General".to_string(),
            version: 1,
            is_public: true,
            is_active: true,
            skill_weights: vec![
                skill("communication", 0.25),
                skill("problem solving", 0.25),
                skill("teamwork", 0.20),
                skill("leadership", 0.10),
            ],
            experience_weights: vec![ExperienceWeight {
                area: "professional".to_string(),
                weight: 0.20,
                minimum_years: 5.0,
            }],
            scoring_rules: ScoringRules::default(),
            created_at: epoch,
            updated_at: epoch,
        }
    }
}

/// How one weight entry contributed to the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub category: ScoreCategory,
    pub name: String,
    pub observed: f64,
    pub required: f64,
    pub weight: f64,
    /// `min(observed / required, cap) * weight * 100`
    pub points: f64,
}

/// Output of the benchmark engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub template_id: TemplateId,
    pub template_version: u32,
    pub category_scores: BTreeMap<ScoreCategory, f64>,
    pub contributions: Vec<Contribution>,
    /// Sum of contribution points before normalization.
    pub weighted_sum: f64,
    pub overall_score: f64,
    pub tier: Tier,
    pub strengths: Vec<String>,
    pub development_areas: Vec<String>,
}

/// Answer to a score request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateScore {
    Scored { result: BenchmarkResult },
    /// No completed enrichment yet; carries the queue state if one exists.
    NotYetEnriched { queue_status: Option<QueueStatus> },
}
