use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Factor -> recommendation. Later duplicates of a factor overwrite earlier ones.
pub type RecommendationMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskFactorSet {
    /// In the order the service emitted them.
    pub factors: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Unknown,
}

impl RiskLevel {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "moderate" | "medium" => RiskLevel::Moderate,
            "high" => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskClassification {
    pub level: RiskLevel,
    /// Non-diagnostic score, 0-100.
    pub score: u8,
    pub rationale: Vec<String>,
}

// Raw stage answers. Every field is optional so a sloppy answer decodes and
// can then be judged, instead of failing as an opaque parse error.

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FactorAnswer {
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClassificationAnswer {
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecommendationAnswer {
    #[serde(default)]
    pub recommendations: Vec<RecommendationItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecommendationItem {
    #[serde(default)]
    pub factor: String,
    #[serde(default)]
    pub recommendation: String,
}

impl RiskFactorSet {
    /// Blank factors are dropped; a missing confidence falls back to how sure
    /// we were of the survey itself.
    pub(crate) fn from_answer(answer: FactorAnswer, record_confidence: f64) -> Self {
        let factors = non_blank(answer.risk_factors);
        let confidence = answer
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(record_confidence)
            .clamp(0.0, 1.0);

        Self {
            factors,
            confidence,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl RiskClassification {
    pub(crate) fn from_answer(answer: ClassificationAnswer) -> Self {
        let level = answer
            .risk_level
            .as_deref()
            .map(RiskLevel::from_label)
            .unwrap_or(RiskLevel::Unknown);
        let score = answer
            .score
            .filter(|s| s.is_finite())
            .map(|s| s.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        Self {
            level,
            score,
            rationale: non_blank(answer.rationale),
        }
    }
}

/// Fold `{factor, recommendation}` pairs into a map, skipping incomplete pairs
/// and factors that are not part of the classification's rationale.
pub(crate) fn fold_recommendations(
    items: Vec<RecommendationItem>,
    rationale: &[String],
) -> RecommendationMap {
    items
        .into_iter()
        .filter_map(|item| {
            let factor = item.factor.trim();
            let recommendation = item.recommendation.trim();
            if factor.is_empty() || recommendation.is_empty() {
                None
            } else if !rationale.iter().any(|r| r == factor) {
                tracing::debug!(factor, "Dropping recommendation outside the rationale");
                None
            } else {
                Some((factor.to_string(), recommendation.to_string()))
            }
        })
        .collect()
}

fn non_blank(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Terminal output of a successful run. Only the pipeline assembles one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    status: &'static str,
    risk_level: RiskLevel,
    score: u8,
    factors: Vec<String>,
    recommendations: RecommendationMap,
}

impl FinalReport {
    pub(crate) fn assemble(
        classification: &RiskClassification,
        factors: RiskFactorSet,
        recommendations: RecommendationMap,
    ) -> Self {
        Self {
            status: "ok",
            risk_level: classification.level,
            score: classification.score,
            factors: factors.factors,
            recommendations,
        }
    }

    pub fn status(&self) -> &str {
        self.status
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn recommendations(&self) -> &RecommendationMap {
        &self.recommendations
    }
}
