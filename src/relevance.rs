//! C4 RelevanceScorer (spec §4.4): keyword-based public-health /
//! local-government relevance scoring. Seed keyword sets are drawn
//! from `original_source/app/legiscan/relevance.py`.

use std::collections::HashSet;

use crate::model::AutoCategories;

/// Threshold above which a category is flagged in `AutoCategories`
/// (SPEC_FULL.md §4 ADD, grounded on `relevance.py`'s `score > 30`).
const AUTO_CATEGORY_THRESHOLD: u8 = 30;

pub const DEFAULT_HEALTH_KEYWORDS: &[&str] = &[
    "health",
    "healthcare",
    "public health",
    "medicaid",
    "medicare",
    "hospital",
    "physician",
    "vaccine",
    "immunization",
    "disease",
    "epidemic",
    "public health emergency",
    "mental health",
    "substance abuse",
    "addiction",
    "opioid",
    "healthcare workforce",
];

pub const DEFAULT_LOCAL_GOV_KEYWORDS: &[&str] = &[
    "municipal",
    "county",
    "local government",
    "city council",
    "zoning",
    "property tax",
    "infrastructure",
    "public works",
    "community development",
    "ordinance",
    "school district",
    "special district",
    "county commissioner",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelevanceScores {
    pub public_health_relevance: u8,
    pub local_gov_relevance: u8,
    pub overall_priority: u8,
    pub auto_categories: AutoCategories,
}

pub struct RelevanceScorer {
    health_keywords: Vec<String>,
    local_gov_keywords: Vec<String>,
}

impl RelevanceScorer {
    pub fn new() -> Self {
        Self::with_keywords(DEFAULT_HEALTH_KEYWORDS, DEFAULT_LOCAL_GOV_KEYWORDS)
    }

    pub fn with_keywords(health_keywords: &[&str], local_gov_keywords: &[&str]) -> Self {
        Self {
            health_keywords: health_keywords.iter().map(|s| s.to_lowercase()).collect(),
            local_gov_keywords: local_gov_keywords.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Scores `title + " " + description` against both keyword
    /// dictionaries: `min(100, 10 * distinct_keyword_hits)` each,
    /// `overall = (health + local_gov) / 2` (integer division).
    pub fn score(&self, title: &str, description: &str) -> RelevanceScores {
        let combined = format!("{title} {description}").to_lowercase();

        let health_hits = Self::distinct_hits(&combined, &self.health_keywords);
        let local_gov_hits = Self::distinct_hits(&combined, &self.local_gov_keywords);

        let health_score = (10 * health_hits).min(100) as u8;
        let local_gov_score = (10 * local_gov_hits).min(100) as u8;
        let overall = ((health_score as u32 + local_gov_score as u32) / 2) as u8;

        RelevanceScores {
            public_health_relevance: health_score,
            local_gov_relevance: local_gov_score,
            overall_priority: overall,
            auto_categories: AutoCategories {
                health: health_score > AUTO_CATEGORY_THRESHOLD,
                local_gov: local_gov_score > AUTO_CATEGORY_THRESHOLD,
            },
        }
    }

    fn distinct_hits(haystack: &str, keywords: &[String]) -> usize {
        keywords
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .count()
    }
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keywords_scores_zero() {
        let scorer = RelevanceScorer::new();
        let scores = scorer.score("An unrelated bill", "about stationery supplies");
        assert_eq!(scores.public_health_relevance, 0);
        assert_eq!(scores.local_gov_relevance, 0);
        assert_eq!(scores.overall_priority, 0);
    }

    #[test]
    fn distinct_hits_scale_linearly_capped_at_100() {
        let scorer = RelevanceScorer::new();
        let scores = scorer.score("A bill about health and healthcare and hospital care", "");
        assert_eq!(scores.public_health_relevance, 30);
    }

    #[test]
    fn score_caps_at_100() {
        let scorer = RelevanceScorer::new();
        let title = DEFAULT_HEALTH_KEYWORDS.join(" ");
        let scores = scorer.score(&title, "");
        assert_eq!(scores.public_health_relevance, 100);
    }

    #[test]
    fn overall_is_integer_average() {
        let scorer = RelevanceScorer::new();
        // one health keyword (10) + one local-gov keyword (10) -> overall 10
        let scores = scorer.score("health and zoning bill", "");
        assert_eq!(scores.public_health_relevance, 10);
        assert_eq!(scores.local_gov_relevance, 10);
        assert_eq!(scores.overall_priority, 10);
    }

    #[test]
    fn auto_categories_flag_above_threshold() {
        let scorer = RelevanceScorer::new();
        let scores = scorer.score("health healthcare hospital physician vaccine", "");
        assert!(scores.auto_categories.health);
        assert!(!scores.auto_categories.local_gov);
    }

    #[test]
    fn is_case_insensitive() {
        let scorer = RelevanceScorer::new();
        let lower = scorer.score("a bill about health", "");
        let upper = scorer.score("A BILL ABOUT HEALTH", "");
        assert_eq!(lower.public_health_relevance, upper.public_health_relevance);
    }
}
