//! C8 BillStore (spec §4.8): idempotent persistence of bills fetched
//! from upstream. Grounded on
//! `original_source/app/legiscan/db.py`'s `save_bill_to_db` upsert
//! flow, realized against the `PersistenceSession` port instead of a
//! SQLAlchemy session.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{PolicyPulseError, Result};
use crate::logging::{report_progress, ProgressEvent};
use crate::model::{
    Amendment, AmendmentStatus, Bill, BillContent, BillSponsor, BillStatus, BillText, GovernmentType, Priority,
    TextMetadata, TextType,
};
use crate::persistence::PersistenceSession;
use crate::relevance::RelevanceScorer;
use crate::sanitizer::TextSanitizer;
use crate::upstream_client::{BillDetail, TextDetail, UpstreamClient};

/// The upstream data source name stored on every `Bill` row
/// (`original_source/app/legiscan/db.py` hardcodes this for the single
/// provider it integrates).
pub const DATA_SOURCE: &str = "legiscan";

pub struct BillStore<P: PersistenceSession, U: UpstreamClient> {
    persistence: Arc<P>,
    upstream: Arc<U>,
    relevance_scorer: RelevanceScorer,
    monitored_jurisdictions: Vec<String>,
}

impl<P: PersistenceSession, U: UpstreamClient> BillStore<P, U> {
    pub fn new(persistence: Arc<P>, upstream: Arc<U>, monitored_jurisdictions: Vec<String>) -> Self {
        Self {
            persistence,
            upstream,
            relevance_scorer: RelevanceScorer::new(),
            monitored_jurisdictions,
        }
    }

    /// Idempotently persists `detail` per spec §4.8 steps 1-9. Steps
    /// 2-9 run inside a transaction (spec §4.8 steps 2/9, §7): a
    /// failure partway through rolls back the whole write instead of
    /// leaving the bill row, sponsors, texts, or amendments out of
    /// sync with each other.
    pub async fn upsert_bill(&self, detail: BillDetail) -> Result<Bill> {
        if !self.monitored_jurisdictions.iter().any(|j| j == &detail.state) {
            return Err(PolicyPulseError::ContentProcessing(format!(
                "jurisdiction {} is not monitored",
                detail.state
            )));
        }

        let tx = self.persistence.begin_transaction().await?;
        match self.upsert_bill_in_transaction(detail).await {
            Ok(bill) => {
                self.persistence.commit(tx).await?;
                Ok(bill)
            }
            Err(err) => {
                self.persistence.rollback(tx).await?;
                Err(err)
            }
        }
    }

    async fn upsert_bill_in_transaction(&self, detail: BillDetail) -> Result<Bill> {
        let now = Utc::now();
        let status = BillStatus::from_upstream_code(detail.status);

        let existing = self.persistence.find_bill(DATA_SOURCE, &detail.bill_id.to_string()).await?;

        let bill = Bill {
            id: existing.as_ref().map(|b| b.id).unwrap_or_else(Uuid::new_v4),
            data_source: DATA_SOURCE.to_string(),
            external_id: detail.bill_id.to_string(),
            government_type: infer_government_type(&detail.state),
            government_source: detail.session.session_name.clone(),
            bill_number: detail.bill_number.clone(),
            bill_type: None,
            title: detail.title.clone(),
            description: detail.description.clone(),
            status,
            url: detail.url.clone(),
            state_link: detail.state_link.clone(),
            change_hash: detail.change_hash.clone(),
            introduced_date: detail.introduced_date.as_deref().and_then(parse_upstream_date),
            last_action_date: detail.last_action_date.as_deref().and_then(parse_upstream_date),
            status_date: detail.status_date.as_deref().and_then(parse_upstream_date),
            last_api_check: Some(now),
            created_at: existing.as_ref().map(|b| b.created_at).unwrap_or(now),
            updated_at: now,
        };
        let is_new = bill.is_newly_created();
        let bill = self.persistence.save_bill(bill).await?;

        let sponsors = detail
            .sponsors
            .iter()
            .map(|s| BillSponsor {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                people_id: s.people_id,
                name: s.name.clone(),
                role: s.role.clone(),
                district: s.district.clone(),
                party: s.party.clone(),
                sponsor_type: s.sponsor_type.clone(),
            })
            .collect();
        self.persistence.replace_sponsors(bill.id, sponsors).await?;

        for text_detail in &detail.texts {
            let (is_binary, content_type, content) = self.resolve_text_content(text_detail).await;
            let bill_text = BillText {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                version_number: text_detail.version,
                text_type: parse_text_type(&text_detail.text_type),
                text_date: text_detail.date.as_deref().and_then(parse_upstream_date),
                text_hash: text_detail.text_hash.clone(),
                is_binary,
                content_type,
                size_bytes: content.len(),
                content,
                metadata: TextMetadata::default(),
            };
            self.persistence.upsert_bill_text(bill_text).await?;
        }

        for amendment_detail in &detail.amendments {
            // Amendments without an id can't be keyed for upsert; skip them
            // and keep processing the rest of the list (spec §4.8).
            let Some(amendment_id) = amendment_detail.amendment_id else {
                continue;
            };
            let amendment = Amendment {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                amendment_external_id: amendment_id.to_string(),
                adopted: amendment_detail.adopted != 0,
                status: if amendment_detail.adopted != 0 {
                    AmendmentStatus::Adopted
                } else {
                    AmendmentStatus::Proposed
                },
                date: amendment_detail.date.as_deref().and_then(parse_upstream_date),
                title: amendment_detail.title.clone(),
                description: amendment_detail.description.clone(),
                hash: amendment_detail.amendment_hash.clone(),
            };
            self.persistence.upsert_amendment(amendment).await?;
        }

        self.recompute_priority(&bill).await?;

        report_progress(ProgressEvent::BillUpserted {
            bill_id: detail.bill_id,
            is_new,
        });

        Ok(bill)
    }

    /// C4 RelevanceScorer invocation (spec §4.4), upserting Priority
    /// transactionally within the bill upsert.
    async fn recompute_priority(&self, bill: &Bill) -> Result<()> {
        let scores = self.relevance_scorer.score(&bill.title, &bill.description);
        let existing = self.persistence.get_priority(bill.id).await?;
        let priority = Priority {
            bill_id: bill.id,
            public_health_relevance: scores.public_health_relevance,
            local_gov_relevance: scores.local_gov_relevance,
            overall_priority: scores.overall_priority,
            auto_categorized: scores.auto_categories.health || scores.auto_categories.local_gov,
            auto_categories: scores.auto_categories,
            notification_sent: existing.map(|p| p.notification_sent).unwrap_or(false),
        };
        self.persistence.upsert_priority(priority).await
    }

    /// Text acquisition policy (spec §4.8): prefer `stateLink` HTTP
    /// fetch; fall back to the inline base64 `doc` payload only for
    /// version 1 or Enrolled/Chaptered texts; sanitize text content
    /// before storage.
    async fn resolve_text_content(&self, text: &TextDetail) -> (bool, String, BillContent) {
        if let Some(link) = &text.state_link {
            if let Ok((bytes, mime_hint)) = self.upstream.fetch_url(link).await {
                if let Some(result) = classify_fetched_content(&bytes, mime_hint.as_deref()) {
                    return result;
                }
            }
        }

        let text_type = parse_text_type(&text.text_type);
        let eligible_for_doc_fallback = text.version == 1 || matches!(text_type, TextType::Enrolled | TextType::Chaptered);
        if eligible_for_doc_fallback {
            if let Some(doc) = &text.doc {
                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(doc) {
                    return classify_decoded_bytes(&bytes);
                }
            }
        }

        (false, "text/plain".to_string(), BillContent::Text(String::new()))
    }
}

/// Classifies bytes fetched over HTTP using the server-reported MIME
/// hint; PDF -> binary, text/html/* -> sanitized text.
fn classify_fetched_content(bytes: &[u8], mime_hint: Option<&str>) -> Option<(bool, String, BillContent)> {
    match mime_hint {
        Some(mime) if mime.eq_ignore_ascii_case("application/pdf") => {
            Some((true, "application/pdf".to_string(), BillContent::Binary(bytes.to_vec())))
        }
        Some(mime) if mime.starts_with("text/") => {
            let text = TextSanitizer::sanitize(&TextSanitizer::ensure_plain_string(bytes));
            Some((false, mime.to_string(), BillContent::Text(text)))
        }
        _ => None,
    }
}

/// Classifies inline `doc` bytes by binary signature (spec §4.8):
/// `%PDF-`, OLE (`\xD0\xCF\x11\xE0`), or zip (`PK\x03\x04`).
fn classify_decoded_bytes(bytes: &[u8]) -> (bool, String, BillContent) {
    if TextSanitizer::is_binary_pdf(bytes) {
        return (true, "application/pdf".to_string(), BillContent::Binary(bytes.to_vec()));
    }
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return (true, "application/msword".to_string(), BillContent::Binary(bytes.to_vec()));
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return (true, "application/zip".to_string(), BillContent::Binary(bytes.to_vec()));
    }
    let text = TextSanitizer::sanitize(&TextSanitizer::ensure_plain_string(bytes));
    (false, "text/plain".to_string(), BillContent::Text(text))
}

fn parse_text_type(raw: &str) -> TextType {
    match raw.to_ascii_lowercase().as_str() {
        "introduced" => TextType::Introduced,
        "enrolled" => TextType::Enrolled,
        "chaptered" => TextType::Chaptered,
        "engrossed" => TextType::Engrossed,
        _ => TextType::Other,
    }
}

fn infer_government_type(state: &str) -> GovernmentType {
    if state.eq_ignore_ascii_case("US") {
        GovernmentType::Federal
    } else {
        GovernmentType::State
    }
}

/// Upstream dates are `YYYY-MM-DD` in the upstream timezone; the core
/// interprets them as UTC midnight for storage (spec §6).
fn parse_upstream_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
