//! C5 MergeEngine (spec §4.5): merges N per-chunk analyses into one
//! coherent `StructuredAnalysis`. Pure function, no I/O, fully unit
//! tested per spec §9 ("Chunk merge cycles ... represent it as a
//! standalone function ... with full unit coverage").

use crate::model::ImpactLevel;
use crate::schema::{
    EconomicImpacts, ImpactSummary, KeyPoint, LocalGovernmentImpacts, PublicHealthImpacts,
    StructuredAnalysis,
};

const SUMMARY_MAX_CHARS: usize = 2000;
const KEY_POINTS_CAP: usize = 15;
const BUCKET_LIST_CAP: usize = 8;
const FLAT_LIST_CAP: usize = 10;
const RECOMMENDED_ACTIONS_CAP: usize = 8;
const IMMEDIATE_RESOURCE_CAP: usize = 5;

pub struct MergeMetadata<'a> {
    pub title: &'a str,
    pub bill_number: &'a str,
    pub chunks_analyzed: usize,
}

pub struct MergeEngine;

impl MergeEngine {
    /// Merges `analyses` per spec §4.5. Returns `None` if `analyses` is empty.
    pub fn merge(analyses: &[StructuredAnalysis], _meta: &MergeMetadata, _has_structure: bool) -> Option<StructuredAnalysis> {
        if analyses.is_empty() {
            return None;
        }

        let summary = Self::merge_summary(analyses);
        let key_points = Self::merge_key_points(analyses);
        let public_health_impacts = Self::merge_public_health(analyses);
        let local_government_impacts = Self::merge_local_gov(analyses);
        let economic_impacts = Self::merge_economic(analyses);
        let environmental_impacts = Self::union_capped(analyses.iter().map(|a| a.environmental_impacts.as_slice()), FLAT_LIST_CAP);
        let education_impacts = Self::union_capped(analyses.iter().map(|a| a.education_impacts.as_slice()), FLAT_LIST_CAP);
        let infrastructure_impacts = Self::union_capped(analyses.iter().map(|a| a.infrastructure_impacts.as_slice()), FLAT_LIST_CAP);
        let recommended_actions = Self::union_capped(analyses.iter().map(|a| a.recommended_actions.as_slice()), RECOMMENDED_ACTIONS_CAP);
        let immediate_actions = Self::union_capped(analyses.iter().map(|a| a.immediate_actions.as_slice()), IMMEDIATE_RESOURCE_CAP);
        let resource_needs = Self::union_capped(analyses.iter().map(|a| a.resource_needs.as_slice()), IMMEDIATE_RESOURCE_CAP);
        let impact_summary = Self::select_highest_severity(analyses);

        Some(StructuredAnalysis {
            summary,
            key_points,
            public_health_impacts,
            local_government_impacts,
            economic_impacts,
            environmental_impacts,
            education_impacts,
            infrastructure_impacts,
            recommended_actions,
            immediate_actions,
            resource_needs,
            impact_summary,
        })
    }

    /// Concatenate with a single space, then truncate to 2000 chars
    /// with a trailing ellipsis marker.
    fn merge_summary(analyses: &[StructuredAnalysis]) -> String {
        let joined = analyses
            .iter()
            .map(|a| a.summary.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.chars().count() > SUMMARY_MAX_CHARS {
            let truncated: String = joined.chars().take(SUMMARY_MAX_CHARS).collect();
            format!("{truncated}...")
        } else {
            joined
        }
    }

    /// Union by `point` text (case-sensitive dedup), capped at 15.
    fn merge_key_points(analyses: &[StructuredAnalysis]) -> Vec<KeyPoint> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for a in analyses {
            for kp in &a.key_points {
                if result.len() >= KEY_POINTS_CAP {
                    break;
                }
                if seen.insert(kp.point.clone()) {
                    result.push(kp.clone());
                }
            }
        }
        result
    }

    fn union_capped<'a, I>(lists: I, cap: usize) -> Vec<String>
    where
        I: Iterator<Item = &'a [String]>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for list in lists {
            for item in list {
                if result.len() >= cap {
                    return result;
                }
                if seen.insert(item.clone()) {
                    result.push(item.clone());
                }
            }
        }
        result
    }

    fn merge_public_health(analyses: &[StructuredAnalysis]) -> PublicHealthImpacts {
        PublicHealthImpacts {
            direct_effects: Self::union_capped(analyses.iter().map(|a| a.public_health_impacts.direct_effects.as_slice()), BUCKET_LIST_CAP),
            indirect_effects: Self::union_capped(analyses.iter().map(|a| a.public_health_impacts.indirect_effects.as_slice()), BUCKET_LIST_CAP),
            funding_impact: Self::union_capped(analyses.iter().map(|a| a.public_health_impacts.funding_impact.as_slice()), BUCKET_LIST_CAP),
            vulnerable_populations: Self::union_capped(analyses.iter().map(|a| a.public_health_impacts.vulnerable_populations.as_slice()), BUCKET_LIST_CAP),
        }
    }

    fn merge_local_gov(analyses: &[StructuredAnalysis]) -> LocalGovernmentImpacts {
        LocalGovernmentImpacts {
            administrative: Self::union_capped(analyses.iter().map(|a| a.local_government_impacts.administrative.as_slice()), BUCKET_LIST_CAP),
            fiscal: Self::union_capped(analyses.iter().map(|a| a.local_government_impacts.fiscal.as_slice()), BUCKET_LIST_CAP),
            implementation: Self::union_capped(analyses.iter().map(|a| a.local_government_impacts.implementation.as_slice()), BUCKET_LIST_CAP),
        }
    }

    fn merge_economic(analyses: &[StructuredAnalysis]) -> EconomicImpacts {
        EconomicImpacts {
            direct_costs: Self::union_capped(analyses.iter().map(|a| a.economic_impacts.direct_costs.as_slice()), BUCKET_LIST_CAP),
            economic_effects: Self::union_capped(analyses.iter().map(|a| a.economic_impacts.economic_effects.as_slice()), BUCKET_LIST_CAP),
            benefits: Self::union_capped(analyses.iter().map(|a| a.economic_impacts.benefits.as_slice()), BUCKET_LIST_CAP),
            long_term_impact: Self::union_capped(analyses.iter().map(|a| a.economic_impacts.long_term_impact.as_slice()), BUCKET_LIST_CAP),
        }
    }

    /// Selects the element with highest severity
    /// (critical > high > moderate > low); ties broken by earliest index.
    fn select_highest_severity(analyses: &[StructuredAnalysis]) -> ImpactSummary {
        let mut best_idx = 0;
        let mut best_level: Option<ImpactLevel> = None;
        for (i, a) in analyses.iter().enumerate() {
            let level = a.impact_summary.impact_level;
            if best_level.is_none() || level > best_level.unwrap() {
                best_level = Some(level);
                best_idx = i;
            }
        }
        analyses[best_idx].impact_summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImpactCategory;
    use crate::schema::{ImpactType, RelevanceToTexas};

    fn analysis_with(summary: &str, level: ImpactLevel) -> StructuredAnalysis {
        StructuredAnalysis {
            summary: summary.to_string(),
            key_points: vec![KeyPoint {
                point: format!("point from {summary}"),
                impact_type: ImpactType::Neutral,
            }],
            public_health_impacts: PublicHealthImpacts::default(),
            local_government_impacts: LocalGovernmentImpacts::default(),
            economic_impacts: EconomicImpacts::default(),
            environmental_impacts: vec![],
            education_impacts: vec![],
            infrastructure_impacts: vec![],
            recommended_actions: vec![],
            immediate_actions: vec![],
            resource_needs: vec![],
            impact_summary: ImpactSummary {
                primary_category: ImpactCategory::PublicHealth,
                impact_level: level,
                relevance_to_texas: RelevanceToTexas::Moderate,
            },
        }
    }

    fn meta() -> MergeMetadata<'static> {
        MergeMetadata {
            title: "Test Bill",
            bill_number: "HB1",
            chunks_analyzed: 3,
        }
    }

    #[test]
    fn empty_input_returns_none() {
        assert!(MergeEngine::merge(&[], &meta(), false).is_none());
    }

    #[test]
    fn summary_concatenates_with_space() {
        let analyses = vec![analysis_with("First part.", ImpactLevel::Low), analysis_with("Second part.", ImpactLevel::Low)];
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.summary, "First part. Second part.");
    }

    #[test]
    fn summary_truncates_at_2000_chars_with_ellipsis() {
        let long = "x".repeat(1500);
        let analyses = vec![analysis_with(&long, ImpactLevel::Low), analysis_with(&long, ImpactLevel::Low)];
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.summary.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(merged.summary.ends_with("..."));
    }

    #[test]
    fn key_points_dedup_case_sensitive_and_cap_at_15() {
        let mut analyses = Vec::new();
        for i in 0..20 {
            let mut a = analysis_with("s", ImpactLevel::Low);
            a.key_points = vec![KeyPoint {
                point: format!("point {i}"),
                impact_type: ImpactType::Neutral,
            }];
            analyses.push(a);
        }
        // duplicate the first point to verify dedup
        analyses.push({
            let mut a = analysis_with("s", ImpactLevel::Low);
            a.key_points = vec![KeyPoint {
                point: "point 0".to_string(),
                impact_type: ImpactType::Neutral,
            }];
            a
        });
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.key_points.len(), KEY_POINTS_CAP);
    }

    #[test]
    fn impact_summary_picks_max_severity_ties_broken_by_earliest_index() {
        let analyses = vec![
            analysis_with("a", ImpactLevel::Moderate),
            analysis_with("b", ImpactLevel::Critical),
            analysis_with("c", ImpactLevel::Critical),
            analysis_with("d", ImpactLevel::Low),
        ];
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.impact_summary.impact_level, ImpactLevel::Critical);
        // earliest critical is index 1 ("b")
        assert_eq!(merged.summary.split(' ').next().unwrap(), "a");
    }

    #[test]
    fn flat_lists_preserve_first_occurrence_order_and_cap() {
        let mut analyses = Vec::new();
        for i in 0..15 {
            let mut a = analysis_with("s", ImpactLevel::Low);
            a.environmental_impacts = vec![format!("env {i}")];
            analyses.push(a);
        }
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.environmental_impacts.len(), FLAT_LIST_CAP);
        assert_eq!(merged.environmental_impacts[0], "env 0");
    }

    #[test]
    fn bucket_lists_cap_at_8_per_field() {
        let mut analyses = Vec::new();
        for i in 0..12 {
            let mut a = analysis_with("s", ImpactLevel::Low);
            a.public_health_impacts.direct_effects = vec![format!("effect {i}")];
            analyses.push(a);
        }
        let merged = MergeEngine::merge(&analyses, &meta(), false).unwrap();
        assert_eq!(merged.public_health_impacts.direct_effects.len(), BUCKET_LIST_CAP);
    }
}
