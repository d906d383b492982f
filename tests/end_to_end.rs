//! Integration tests exercising the concrete end-to-end scenarios against
//! `InMemorySession` and fake `UpstreamClient`/`ModelClient` doubles. Unit
//! tests embedded in each module cover the remaining scenarios
//! (sync no-change/new-bill in `sync_engine.rs`, analyze-short-text and
//! batch-with-failures in `analysis_engine.rs`); this file covers the two
//! scenarios that need a full chunk/merge or vision round trip.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use policypulse_core::error::{PolicyPulseError, Result};
use policypulse_core::model::{
    Bill, BillContent, BillStatus, BillText, GovernmentType, ImpactCategory, ImpactLevel, TextMetadata, TextType,
};
use policypulse_core::model_client::{AnalysisSchema, ChatMessage, ModelClient, ModelOptions};
use policypulse_core::persistence::{InMemorySession, PersistenceSession};
use policypulse_core::schema::{EconomicImpacts, ImpactSummary, LocalGovernmentImpacts, PublicHealthImpacts, RelevanceToTexas, StructuredAnalysis};
use policypulse_core::AnalysisEngine;
use uuid::Uuid;

fn response_with_level(level: ImpactLevel) -> serde_json::Value {
    serde_json::to_value(StructuredAnalysis {
        summary: "A detailed summary describing the effects of this section of the bill.".to_string(),
        key_points: vec![],
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
    })
    .unwrap()
}

/// Every chunk reports `high`, so regardless of how the chunker happens to
/// group the 12 sections, the merged result is `high` too (spec §8
/// scenario 4's actual requirement is just that *one* chunk returning
/// `high` is enough to dominate the merge).
struct ChunkAwareModel {
    calls: AtomicU32,
}

#[async_trait]
impl ModelClient for ChunkAwareModel {
    fn supports_vision(&self) -> bool {
        false
    }

    async fn structured_completion(&self, _messages: &[ChatMessage], _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(response_with_level(ImpactLevel::High))
    }

    async fn structured_completion_with_pdf(&self, _pdf_bytes: &[u8], _prompt: &str, _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
        unreachable!("this scenario never selects the pdf path")
    }
}

fn section(n: usize, body: &str) -> String {
    format!("Section {n}. Implementation.\n\n{body}\n\n")
}

async fn seed_bill_with_content(persistence: &InMemorySession, content: BillContent, is_binary: bool, content_type: &str) -> Uuid {
    let now = chrono::Utc::now();
    let bill = Bill {
        id: Uuid::new_v4(),
        data_source: "legiscan".to_string(),
        external_id: "408".to_string(),
        government_type: GovernmentType::State,
        government_source: "89th Legislature".to_string(),
        bill_number: "HB 408".to_string(),
        bill_type: None,
        title: "An act relating to water infrastructure funding".to_string(),
        description: "Establishes a grant program for local water systems.".to_string(),
        status: BillStatus::Introduced,
        url: None,
        state_link: None,
        change_hash: None,
        introduced_date: None,
        last_action_date: None,
        status_date: None,
        last_api_check: None,
        created_at: now,
        updated_at: now,
    };
    let bill = persistence.save_bill(bill).await.unwrap();
    persistence
        .upsert_bill_text(BillText {
            id: Uuid::new_v4(),
            bill_id: bill.id,
            version_number: 1,
            text_type: TextType::Introduced,
            text_date: None,
            text_hash: None,
            is_binary,
            content_type: content_type.to_string(),
            size_bytes: content.len(),
            content,
            metadata: TextMetadata::default(),
        })
        .await
        .unwrap();
    bill.id
}

/// Scenario 4: a 240 000-token document with 12 section markers, analyzed
/// against `maxContextTokens=120000, safetyBuffer=20000`, must be chunked
/// into multiple pieces each within the (lower) effective budget, and the
/// merged result must surface the highest impact level seen across chunks.
#[tokio::test]
async fn analyze_long_text_chunks_and_merges_to_highest_impact() {
    let paragraph = "The department shall administer this program in accordance with rules adopted under this chapter, \
         coordinating with local governments to ensure timely disbursement of funds and consistent reporting. "
        .repeat(400);

    let mut text = String::new();
    for n in 1..=12 {
        text.push_str(&section(n, &paragraph));
    }

    let persistence = Arc::new(InMemorySession::new());
    let bill_id = seed_bill_with_content(&persistence, BillContent::Text(text), false, "text/plain").await;

    let model = Arc::new(ChunkAwareModel { calls: AtomicU32::new(0) });
    let engine = AnalysisEngine::new(persistence.clone(), model.clone(), Duration::from_secs(1800), 120_000, 20_000);

    let analysis = engine.analyze_async(bill_id).await.unwrap();

    assert!(!analysis.insufficient_text);
    assert_eq!(analysis.impact_level, ImpactLevel::High);
    assert!(model.calls.load(Ordering::SeqCst) > 1, "expected chunking to trigger more than one model call");

    let priority = persistence.get_priority(bill_id).await.unwrap();
    assert!(priority.is_some());
}

struct VisionModel {
    calls: AtomicU32,
    response: serde_json::Value,
}

#[async_trait]
impl ModelClient for VisionModel {
    fn supports_vision(&self) -> bool {
        true
    }

    async fn structured_completion(&self, _messages: &[ChatMessage], _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
        unreachable!("this scenario only selects the pdf path")
    }

    async fn structured_completion_with_pdf(&self, pdf_bytes: &[u8], _prompt: &str, _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
        assert!(pdf_bytes.starts_with(b"%PDF-"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Scenario 5: binary PDF content with `contentType=application/pdf` and a
/// vision-capable model routes through `structuredCompletionWithPdf`, and
/// the persisted analysis's `rawPayload` equals the returned JSON.
#[tokio::test]
async fn analyze_pdf_routes_through_vision_path_and_preserves_raw_payload() {
    let pdf_bytes = b"%PDF-\n1 0 obj\n<< /Type /Catalog >>\nendobj\n".to_vec();
    let persistence = Arc::new(InMemorySession::new());
    let bill_id = seed_bill_with_content(&persistence, BillContent::Binary(pdf_bytes), true, "application/pdf").await;

    let response = response_with_level(ImpactLevel::Moderate);
    let model = Arc::new(VisionModel {
        calls: AtomicU32::new(0),
        response: response.clone(),
    });
    let engine = AnalysisEngine::new(persistence.clone(), model.clone(), Duration::from_secs(1800), 120_000, 20_000);

    let analysis = engine.analyze_async(bill_id).await.unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert!(!analysis.insufficient_text);
    let expected_structured: StructuredAnalysis = serde_json::from_value(response).unwrap();
    assert_eq!(analysis.raw_payload, serde_json::to_value(&expected_structured).unwrap());
}

/// Non-vision models must never be sent binary PDF content; the engine
/// falls back to `bill.description` as the text source instead.
#[tokio::test]
async fn pdf_without_vision_support_falls_back_to_description() {
    struct TextOnlyModel {
        calls: AtomicU32,
        response: serde_json::Value,
    }

    #[async_trait]
    impl ModelClient for TextOnlyModel {
        fn supports_vision(&self) -> bool {
            false
        }
        async fn structured_completion(&self, messages: &[ChatMessage], _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(messages.iter().any(|m| m.content.contains("grant program")));
            Ok(self.response.clone())
        }
        async fn structured_completion_with_pdf(&self, _pdf_bytes: &[u8], _prompt: &str, _schema: &AnalysisSchema, _options: &ModelOptions) -> Result<serde_json::Value> {
            unreachable!("non-vision models must not receive the pdf path")
        }
    }

    let pdf_bytes = b"%PDF-\nirrelevant binary content".to_vec();
    let persistence = Arc::new(InMemorySession::new());
    let bill_id = seed_bill_with_content(&persistence, BillContent::Binary(pdf_bytes), true, "application/pdf").await;

    let model = Arc::new(TextOnlyModel {
        calls: AtomicU32::new(0),
        response: response_with_level(ImpactLevel::Moderate),
    });
    let engine = AnalysisEngine::new(persistence.clone(), model.clone(), Duration::from_secs(1800), 120_000, 20_000);

    // The description alone is short, so this exercises the
    // insufficient-text path without ever calling the model with binary
    // content — if it did, the `unreachable!` above would panic.
    let analysis = engine.analyze_async(bill_id).await.unwrap();
    assert!(analysis.insufficient_text);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

/// `upsertBill(detail); upsertBill(detail)` leaves the store in the same
/// state after the second call (spec §8 idempotence law), verified through
/// `BillStore` against `InMemorySession` with a populated text+amendment.
/// The amendment list also covers the missing-`amendment_id` skip: one
/// amendment has an id and one doesn't, and only the former is persisted.
#[tokio::test]
async fn repeated_bill_sync_is_idempotent_end_to_end() {
    use policypulse_core::upstream_client::{AmendmentDetail, BillDetail, MasterListRaw, Session, SessionRef, SponsorDetail, TextDetail, TextPayload, UpstreamClient};
    use policypulse_core::BillStore;

    struct StubUpstream;

    #[async_trait]
    impl UpstreamClient for StubUpstream {
        async fn session_list(&self, _state: &str) -> Result<Vec<Session>> {
            Ok(vec![])
        }
        async fn master_list_raw(&self, _session_id: i64) -> Result<MasterListRaw> {
            Ok(MasterListRaw::new())
        }
        async fn bill(&self, _bill_id: i64) -> Result<BillDetail> {
            unimplemented!()
        }
        async fn bill_text(&self, _doc_id: i64) -> Result<TextPayload> {
            Ok(TextPayload::Text(String::new()))
        }
        async fn search_raw(&self, _state: &str, _query: &str, _year: Option<i32>) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn fetch_url(&self, _url: &str) -> Result<(Vec<u8>, Option<String>)> {
            Err(PolicyPulseError::Api("no network in tests".into()))
        }
    }

    fn detail() -> BillDetail {
        BillDetail {
            bill_id: 408,
            state: "TX".to_string(),
            bill_number: "HB 408".to_string(),
            title: "An act relating to water infrastructure funding".to_string(),
            description: "Establishes a grant program for local water systems.".to_string(),
            status: Some(1),
            status_date: Some("2026-01-02".to_string()),
            introduced_date: Some("2026-01-01".to_string()),
            last_action_date: None,
            session: SessionRef {
                session_name: "89th Legislature".to_string(),
            },
            sponsors: vec![SponsorDetail {
                people_id: Some(42),
                name: "Sen. Example".to_string(),
                role: Some("sponsor".to_string()),
                district: None,
                party: None,
                sponsor_type: None,
            }],
            texts: vec![TextDetail {
                doc_id: 1,
                version: 1,
                text_type: "introduced".to_string(),
                date: Some("2026-01-01".to_string()),
                mime_id: None,
                text_hash: Some("hash-1".to_string()),
                state_link: None,
                doc: None,
            }],
            amendments: vec![
                AmendmentDetail {
                    amendment_id: Some(9),
                    date: Some("2026-01-05".to_string()),
                    adopted: 0,
                    title: Some("Amendment 9".to_string()),
                    description: None,
                    amendment_hash: Some("amend-hash".to_string()),
                    state_link: None,
                },
                AmendmentDetail {
                    amendment_id: None,
                    date: Some("2026-01-06".to_string()),
                    adopted: 0,
                    title: Some("Amendment with no id".to_string()),
                    description: None,
                    amendment_hash: Some("amend-hash-missing".to_string()),
                    state_link: None,
                },
            ],
            url: None,
            state_link: None,
            change_hash: Some("abc123".to_string()),
        }
    }

    let persistence = Arc::new(InMemorySession::new());
    let store = BillStore::new(persistence.clone(), Arc::new(StubUpstream), vec!["TX".to_string()]);

    let first = store.upsert_bill(detail()).await.unwrap();
    let second = store.upsert_bill(detail()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.change_hash, second.change_hash);
    assert_eq!(first.bill_number, second.bill_number);

    // The second amendment in `detail()` has no `amendment_id` and must be
    // skipped, leaving only the one with a present id persisted.
    let amendment_count = persistence.amendment_count(second.id).await.unwrap();
    assert_eq!(amendment_count, 1);
}
