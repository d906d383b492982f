//! Structured analysis response schema (spec §6). These types are the
//! single source of truth for what a `ModelClient` call must return;
//! `model_client::recover_json` parses into `serde_json::Value` first
//! and `StructuredAnalysis::from_value` then validates/coerces against
//! this shape, falling back to the insufficient-text template on
//! missing required fields (spec §9 "Schema validation").

use serde::{Deserialize, Serialize};

use crate::model::{ImpactCategory, ImpactLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub point: String,
    pub impact_type: ImpactType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicHealthImpacts {
    #[serde(default)]
    pub direct_effects: Vec<String>,
    #[serde(default)]
    pub indirect_effects: Vec<String>,
    #[serde(default)]
    pub funding_impact: Vec<String>,
    #[serde(default)]
    pub vulnerable_populations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGovernmentImpacts {
    #[serde(default)]
    pub administrative: Vec<String>,
    #[serde(default)]
    pub fiscal: Vec<String>,
    #[serde(default)]
    pub implementation: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicImpacts {
    #[serde(default)]
    pub direct_costs: Vec<String>,
    #[serde(default)]
    pub economic_effects: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub long_term_impact: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceToTexas {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub primary_category: ImpactCategory,
    pub impact_level: ImpactLevel,
    pub relevance_to_texas: RelevanceToTexas,
}

impl ImpactSummary {
    pub fn insufficient_text() -> Self {
        Self {
            primary_category: ImpactCategory::PublicHealth,
            impact_level: ImpactLevel::Low,
            relevance_to_texas: RelevanceToTexas::Low,
        }
    }
}

/// The full model response, parsed and validated against the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<KeyPoint>,
    #[serde(default)]
    pub public_health_impacts: PublicHealthImpacts,
    #[serde(default)]
    pub local_government_impacts: LocalGovernmentImpacts,
    #[serde(default)]
    pub economic_impacts: EconomicImpacts,
    #[serde(default)]
    pub environmental_impacts: Vec<String>,
    #[serde(default)]
    pub education_impacts: Vec<String>,
    #[serde(default)]
    pub infrastructure_impacts: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default)]
    pub resource_needs: Vec<String>,
    pub impact_summary: ImpactSummary,
}

/// Canonical placeholder the model is instructed to emit when content
/// is too sparse (spec §4.10).
pub const INSUFFICIENT_TEXT_MARKER: &str = "INSUFFICIENT_TEXT_FOR_ANALYSIS";

/// The canonical human-facing insufficient-text summary (spec §8 scenario 3).
pub const INSUFFICIENT_TEXT_SUMMARY: &str = "Insufficient text available for detailed analysis.";

impl StructuredAnalysis {
    /// The canonical insufficient-text template (spec §4.10, §8 scenario 3).
    pub fn insufficient_text() -> Self {
        Self {
            summary: INSUFFICIENT_TEXT_SUMMARY.to_string(),
            key_points: Vec::new(),
            public_health_impacts: PublicHealthImpacts::default(),
            local_government_impacts: LocalGovernmentImpacts::default(),
            economic_impacts: EconomicImpacts::default(),
            environmental_impacts: Vec::new(),
            education_impacts: Vec::new(),
            infrastructure_impacts: Vec::new(),
            recommended_actions: Vec::new(),
            immediate_actions: Vec::new(),
            resource_needs: Vec::new(),
            impact_summary: ImpactSummary::insufficient_text(),
        }
    }

    /// True when the model's own summary signals insufficient content,
    /// per spec §4.10: equal to the marker string, or under 20 chars.
    pub fn signals_insufficient_text(&self) -> bool {
        self.summary == INSUFFICIENT_TEXT_MARKER || self.summary.chars().count() < 20
    }

    /// Parses and validates a raw model JSON value against this
    /// schema. Missing required fields fall back to the
    /// insufficient-text template (spec §9 "Schema validation").
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_text_template_matches_spec() {
        let t = StructuredAnalysis::insufficient_text();
        assert_eq!(t.summary, "Insufficient text available for detailed analysis.");
        assert_eq!(t.impact_summary.primary_category, ImpactCategory::PublicHealth);
        assert_eq!(t.impact_summary.impact_level, ImpactLevel::Low);
        assert_eq!(t.impact_summary.relevance_to_texas, RelevanceToTexas::Low);
    }

    #[test]
    fn signals_insufficient_on_marker_or_short_summary() {
        let mut a = StructuredAnalysis::insufficient_text();
        a.summary = INSUFFICIENT_TEXT_MARKER.to_string();
        assert!(a.signals_insufficient_text());

        a.summary = "too short".to_string();
        assert!(a.signals_insufficient_text());

        a.summary = "a".repeat(25);
        assert!(!a.signals_insufficient_text());
    }

    #[test]
    fn from_value_rejects_missing_required_fields() {
        let v = serde_json::json!({"key_points": []});
        assert!(StructuredAnalysis::from_value(&v).is_none());
    }

    #[test]
    fn from_value_accepts_minimal_valid_payload() {
        let v = serde_json::json!({
            "summary": "A reasonably long summary describing the bill's effects.",
            "impact_summary": {
                "primary_category": "public_health",
                "impact_level": "moderate",
                "relevance_to_texas": "high"
            }
        });
        let parsed = StructuredAnalysis::from_value(&v).unwrap();
        assert_eq!(parsed.impact_summary.impact_level, ImpactLevel::Moderate);
        assert!(parsed.key_points.is_empty());
    }
}
