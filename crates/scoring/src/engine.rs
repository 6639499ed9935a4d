//! Weighted benchmark scoring.
//!
//! For every weight entry the observed value is looked up (missing counts
//! as 0) and contributes `min(observed / required, cap) * weight * 100`
//! points. A category's score is its points divided by its total weight,
//! then passed through the template's custom formulas for that category.
//! The overall score is the weight-averaged category score. Everything is
//! bounded to 0-100 and the function is pure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pipeline_core::limits::MAX_SCORE;
use pipeline_core::{
    BenchmarkResult, BenchmarkTemplate, Contribution, ScoreCategory, StoredScore, StructuredEnrichment, Tier,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct BenchmarkEngine;

#[derive(Debug, Default)]
struct CategoryTotals {
    points: f64,
    weight: f64,
}

impl BenchmarkEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, enrichment: &StructuredEnrichment, template: &BenchmarkTemplate) -> BenchmarkResult {
        let cap = template.scoring_rules.level_cap;
        let mut contributions = Vec::with_capacity(template.skill_weights.len() + template.experience_weights.len());

        for weight in &template.skill_weights {
            contributions.push(contribution(
                ScoreCategory::Skills,
                &weight.skill_name,
                enrichment.skill_level(&weight.skill_name),
                weight.minimum_level,
                weight.weight,
                cap,
            ));
        }
        for weight in &template.experience_weights {
            contributions.push(contribution(
                ScoreCategory::Experience,
                &weight.area,
                enrichment.experience_years(&weight.area),
                weight.minimum_years,
                weight.weight,
                cap,
            ));
        }

        let mut totals: BTreeMap<ScoreCategory, CategoryTotals> = BTreeMap::new();
        for c in &contributions {
            let entry = totals.entry(c.category).or_default();
            entry.points += c.points;
            entry.weight += c.weight;
        }

        let mut category_scores = BTreeMap::new();
        let mut weighted_total = 0.0;
        let mut weight_total = 0.0;
        for (category, total) in &totals {
            if total.weight <= 0.0 {
                continue;
            }
            let mut score = total.points / total.weight;
            for formula in template
                .scoring_rules
                .custom_formulas
                .iter()
                .filter(|f| f.category == *category)
            {
                score = formula.rule.apply(score);
            }
            let score = bounded(score);
            category_scores.insert(*category, score);
            weighted_total += score * total.weight;
            weight_total += total.weight;
        }

        let overall_score = if weight_total > 0.0 {
            bounded(weighted_total / weight_total)
        } else {
            0.0
        };

        let (strengths, development_areas): (Vec<_>, Vec<_>) =
            contributions.iter().partition(|c| c.observed >= c.required);

        BenchmarkResult {
            template_id: template.id.clone(),
            template_version: template.version,
            category_scores,
            weighted_sum: contributions.iter().map(|c| c.points).sum(),
            tier: tier_for(template, overall_score),
            strengths: strengths.into_iter().map(|c| c.name.clone()).collect(),
            development_areas: development_areas.into_iter().map(|c| c.name.clone()).collect(),
            overall_score,
            contributions,
        }
    }

    /// Compact form persisted on the enrichment record.
    pub fn to_stored(result: &BenchmarkResult, scored_at: DateTime<Utc>) -> StoredScore {
        StoredScore {
            template_version: result.template_version,
            overall_score: result.overall_score,
            tier: result.tier.clone(),
            scored_at,
        }
    }
}

fn contribution(
    category: ScoreCategory,
    name: &str,
    observed: f64,
    required: f64,
    weight: f64,
    cap: f64,
) -> Contribution {
    let ratio = if required > 0.0 { observed / required } else { cap };
    Contribution {
        category,
        name: name.to_string(),
        observed,
        required,
        weight,
        points: ratio.clamp(0.0, cap) * weight * MAX_SCORE,
    }
}

fn bounded(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}

/// Highest tier whose inclusive lower bound the score reaches. A score below
/// every bound falls into the lowest tier.
fn tier_for(template: &BenchmarkTemplate, score: f64) -> Tier {
    let thresholds = template.effective_thresholds();
    thresholds
        .iter()
        .find(|t| score >= t.min_score)
        .or_else(|| thresholds.last())
        .map(|t| t.tier.clone())
        .unwrap_or_else(|| Tier::new("C"))
}
