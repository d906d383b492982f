//! Entities from spec §3: Bill and its owned children, SyncRun and its
//! owned SyncError children. Plain `serde`-derived data types, mirroring
//! the teacher's plain-data style (`Document`/`Extraction`/`AnnotatedDocument`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentType {
    Federal,
    State,
    County,
    City,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    New,
    Introduced,
    Updated,
    Passed,
    Defeated,
    Vetoed,
    Enacted,
    Pending,
}

impl BillStatus {
    /// Maps the upstream status code per spec §4.8 step 3.
    pub fn from_upstream_code(code: Option<i32>) -> Self {
        match code {
            None => BillStatus::New,
            Some(1) => BillStatus::Introduced,
            Some(2) | Some(3) => BillStatus::Updated,
            Some(4) => BillStatus::Passed,
            Some(5) => BillStatus::Vetoed,
            Some(6) => BillStatus::Defeated,
            Some(7) => BillStatus::Enacted,
            Some(_) => BillStatus::Updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub data_source: String,
    pub external_id: String,
    pub government_type: GovernmentType,
    pub government_source: String,
    pub bill_number: String,
    pub bill_type: Option<String>,
    pub title: String,
    pub description: String,
    pub status: BillStatus,
    pub url: Option<String>,
    pub state_link: Option<String>,
    pub change_hash: Option<String>,
    pub introduced_date: Option<DateTime<Utc>>,
    pub last_action_date: Option<DateTime<Utc>>,
    pub status_date: Option<DateTime<Utc>>,
    pub last_api_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Per spec §4.9 step d: a bill fetched for the first time has
    /// `created_at == updated_at`.
    pub fn is_newly_created(&self) -> bool {
        self.created_at == self.updated_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    Introduced,
    Enrolled,
    Chaptered,
    Engrossed,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillText {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub version_number: i32,
    pub text_type: TextType,
    pub text_date: Option<DateTime<Utc>>,
    pub text_hash: Option<String>,
    pub is_binary: bool,
    pub content_type: String,
    pub size_bytes: usize,
    pub content: BillContent,
    pub metadata: TextMetadata,
}

/// Tagged content variant, replacing the source's dynamic
/// `hasattr`/try-except probing for binary vs. text content (spec §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillContent {
    Text(String),
    Binary(Vec<u8>),
}

impl BillContent {
    pub fn is_binary(&self) -> bool {
        matches!(self, BillContent::Binary(_))
    }

    pub fn len(&self) -> usize {
        match self {
            BillContent::Text(s) => s.len(),
            BillContent::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes to text, replacing invalid UTF-8 sequences, for callers
    /// that need a text view regardless of storage representation.
    pub fn as_text_lossy(&self) -> String {
        match self {
            BillContent::Text(s) => s.clone(),
            BillContent::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMetadata {
    pub origin: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSponsor {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub people_id: Option<i64>,
    pub name: String,
    pub role: Option<String>,
    pub district: Option<String>,
    pub party: Option<String>,
    pub sponsor_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentStatus {
    Proposed,
    Adopted,
    Rejected,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amendment_external_id: String,
    pub adopted: bool,
    pub status: AmendmentStatus,
    pub date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactCategory {
    PublicHealth,
    LocalGov,
    Economic,
    Environmental,
    Education,
    Infrastructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub version: i32,
    pub analysis_date: DateTime<Utc>,
    pub model_version: String,
    pub summary: String,
    pub key_points: Vec<crate::schema::KeyPoint>,
    pub public_health_impacts: crate::schema::PublicHealthImpacts,
    pub local_government_impacts: crate::schema::LocalGovernmentImpacts,
    pub economic_impacts: crate::schema::EconomicImpacts,
    pub environmental_impacts: Vec<String>,
    pub education_impacts: Vec<String>,
    pub infrastructure_impacts: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub immediate_actions: Vec<String>,
    pub resource_needs: Vec<String>,
    pub impact_category: ImpactCategory,
    pub impact_level: ImpactLevel,
    pub confidence_score: f32,
    pub insufficient_text: bool,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCategories {
    pub health: bool,
    pub local_gov: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub bill_id: Uuid,
    pub public_health_relevance: u8,
    pub local_gov_relevance: u8,
    pub overall_priority: u8,
    pub auto_categorized: bool,
    pub auto_categories: AutoCategories,
    pub notification_sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunType {
    Manual,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub id: Uuid,
    pub sync_run_id: Uuid,
    pub bill_id: Option<i64>,
    pub error_type: String,
    pub message: String,
    /// Truncated per `MAX_STACK_EXCERPT_CHARS` (SPEC_FULL.md §4 ADD).
    pub stack_excerpt: Option<String>,
}

pub const MAX_STACK_EXCERPT_CHARS: usize = 2000;
pub const MAX_ERROR_SAMPLES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub run_type: SyncRunType,
    pub status: SyncRunStatus,
    pub new_bills: u32,
    pub updated_bills: u32,
    pub amendments_tracked: u32,
    pub error_samples: Vec<SyncError>,
}

impl SyncRun {
    pub fn new(run_type: SyncRunType, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            run_type,
            status: SyncRunStatus::InProgress,
            new_bills: 0,
            updated_bills: 0,
            amendments_tracked: 0,
            error_samples: Vec::new(),
        }
    }

    /// Records an error, truncating the stack excerpt and keeping at
    /// most `MAX_ERROR_SAMPLES` samples (spec §3, §9 ADD).
    pub fn record_error(&mut self, bill_id: Option<i64>, error_type: &str, message: &str, stack: Option<&str>) {
        if self.error_samples.len() < MAX_ERROR_SAMPLES {
            let stack_excerpt = stack.map(|s| {
                if s.len() > MAX_STACK_EXCERPT_CHARS {
                    s[..MAX_STACK_EXCERPT_CHARS].to_string()
                } else {
                    s.to_string()
                }
            });
            self.error_samples.push(SyncError {
                id: Uuid::new_v4(),
                sync_run_id: self.id,
                bill_id,
                error_type: error_type.to_string(),
                message: message.to_string(),
                stack_excerpt,
            });
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub status: SyncRunStatus,
    pub new_bills: u32,
    pub updated_bills: u32,
    pub amendments_tracked: u32,
    pub error_count: usize,
    pub error_samples: Vec<SyncError>,
}

impl Default for SyncRunStatus {
    fn default() -> Self {
        SyncRunStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_fixed_table() {
        assert_eq!(BillStatus::from_upstream_code(None), BillStatus::New);
        assert_eq!(BillStatus::from_upstream_code(Some(1)), BillStatus::Introduced);
        assert_eq!(BillStatus::from_upstream_code(Some(2)), BillStatus::Updated);
        assert_eq!(BillStatus::from_upstream_code(Some(3)), BillStatus::Updated);
        assert_eq!(BillStatus::from_upstream_code(Some(4)), BillStatus::Passed);
        assert_eq!(BillStatus::from_upstream_code(Some(5)), BillStatus::Vetoed);
        assert_eq!(BillStatus::from_upstream_code(Some(6)), BillStatus::Defeated);
        assert_eq!(BillStatus::from_upstream_code(Some(7)), BillStatus::Enacted);
        assert_eq!(BillStatus::from_upstream_code(Some(99)), BillStatus::Updated);
    }

    #[test]
    fn impact_level_ordering_matches_severity() {
        assert!(ImpactLevel::Critical > ImpactLevel::High);
        assert!(ImpactLevel::High > ImpactLevel::Moderate);
        assert!(ImpactLevel::Moderate > ImpactLevel::Low);
    }

    #[test]
    fn sync_run_caps_error_samples() {
        let mut run = SyncRun::new(SyncRunType::Manual, Utc::now());
        for i in 0..10 {
            run.record_error(Some(i), "ApiError", "boom", None);
        }
        assert_eq!(run.error_samples.len(), MAX_ERROR_SAMPLES);
    }

    #[test]
    fn sync_run_truncates_stack_excerpt() {
        let mut run = SyncRun::new(SyncRunType::Manual, Utc::now());
        let long_stack = "x".repeat(MAX_STACK_EXCERPT_CHARS + 500);
        run.record_error(Some(1), "ApiError", "boom", Some(&long_stack));
        let excerpt = run.error_samples[0].stack_excerpt.as_ref().unwrap();
        assert_eq!(excerpt.len(), MAX_STACK_EXCERPT_CHARS);
    }
}
