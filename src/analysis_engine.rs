//! C10 AnalysisEngine (spec §4.10): the per-bill and batch analysis
//! entry points. Grounded on
//! `original_source/app/ai_analysis/analyzer.py`'s `analyze_bill`
//! procedure, realized against the `ModelClient`/`PersistenceSession`
//! ports and this crate's `Chunker`/`MergeEngine`/`AnalysisCache`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::AnalysisCache;
use crate::chunking::Chunker;
use crate::error::{PolicyPulseError, Result};
use crate::logging::{report_progress, ProgressEvent};
use crate::merge::{MergeEngine, MergeMetadata};
use crate::model::{Analysis, AutoCategories, Bill, BillContent, Priority};
use crate::model_client::{AnalysisSchema, ChatMessage, ModelClient, ModelOptions};
use crate::persistence::PersistenceSession;
use crate::relevance::RelevanceScorer;
use crate::schema::StructuredAnalysis;
use crate::token_counter::TokenCounter;

/// Below this token count the model is not called at all (spec §4.10 step 5b).
pub const MIN_TOKENS_FOR_ANALYSIS: usize = 300;

/// A per-item failure captured in a batch run (spec §4.10).
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub bill_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub duration_seconds: f64,
    pub avg_per_item: f64,
    pub failures: Vec<BatchFailure>,
}

pub struct AnalysisEngine<P: PersistenceSession, M: ModelClient> {
    persistence: Arc<P>,
    model: Arc<M>,
    cache: AnalysisCache,
    token_counter: TokenCounter,
    relevance_scorer: RelevanceScorer,
    max_context_tokens: usize,
    safety_buffer: usize,
}

impl<P: PersistenceSession, M: ModelClient> AnalysisEngine<P, M> {
    pub fn new(persistence: Arc<P>, model: Arc<M>, cache_ttl: Duration, max_context_tokens: usize, safety_buffer: usize) -> Self {
        Self {
            persistence,
            model,
            cache: AnalysisCache::new(cache_ttl),
            token_counter: TokenCounter::new(),
            relevance_scorer: RelevanceScorer::new(),
            max_context_tokens,
            safety_buffer,
        }
    }

    /// Blocking façade over [`Self::analyze_async`] for callers outside
    /// an async context. Must be called from within a tokio runtime.
    pub fn analyze(&self, bill_id: Uuid) -> Result<Analysis> {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.analyze_async(bill_id)))
    }

    /// Entry point (spec §4.10): cache → load → content selection →
    /// model call(s) → persist → cache update.
    pub async fn analyze_async(&self, bill_id: Uuid) -> Result<Analysis> {
        if let Some(cached) = self.cache.get(bill_id).await {
            report_progress(ProgressEvent::CacheHit { bill_id });
            return Ok(cached);
        }

        self.cache.get_or_insert_with(bill_id, || self.compute_analysis(bill_id)).await
    }

    async fn compute_analysis(&self, bill_id: Uuid) -> Result<Analysis> {
        let bill = self
            .persistence
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| PolicyPulseError::NotFound(format!("bill {bill_id}")))?;

        let latest_text = self.persistence.latest_bill_text(bill_id).await?;

        let structured = if self.should_use_pdf_path(&latest_text) {
            self.analyze_pdf(&bill, latest_text.as_ref().unwrap()).await
        } else {
            let text = self.select_text_source(&bill, latest_text.as_ref());
            self.analyze_text(&bill, &text).await
        };

        let structured = structured.unwrap_or_else(|_| StructuredAnalysis::insufficient_text());
        let insufficient_text = structured.signals_insufficient_text();
        let structured = if insufficient_text {
            StructuredAnalysis::insufficient_text()
        } else {
            structured
        };

        let version = self.persistence.next_analysis_version(bill_id).await?;
        let analysis = Analysis {
            id: Uuid::new_v4(),
            bill_id,
            version,
            analysis_date: Utc::now(),
            model_version: "default".to_string(),
            summary: structured.summary.clone(),
            key_points: structured.key_points.clone(),
            public_health_impacts: structured.public_health_impacts.clone(),
            local_government_impacts: structured.local_government_impacts.clone(),
            economic_impacts: structured.economic_impacts.clone(),
            environmental_impacts: structured.environmental_impacts.clone(),
            education_impacts: structured.education_impacts.clone(),
            infrastructure_impacts: structured.infrastructure_impacts.clone(),
            recommended_actions: structured.recommended_actions.clone(),
            immediate_actions: structured.immediate_actions.clone(),
            resource_needs: structured.resource_needs.clone(),
            impact_category: structured.impact_summary.primary_category,
            impact_level: structured.impact_summary.impact_level,
            confidence_score: if insufficient_text { 0.0 } else { 1.0 },
            insufficient_text,
            raw_payload: serde_json::to_value(&structured).unwrap_or(serde_json::Value::Null),
        };

        // insert_analysis + recompute_priority run as a unit so a
        // failed priority recompute doesn't leave an analysis row
        // persisted with a stale priority (spec §7).
        let tx = self.persistence.begin_transaction().await?;
        match self.persist_analysis_and_priority(&analysis, &bill).await {
            Ok(()) => self.persistence.commit(tx).await?,
            Err(err) => {
                self.persistence.rollback(tx).await?;
                return Err(err);
            }
        }

        report_progress(ProgressEvent::AnalysisPersisted {
            bill_id,
            version,
            insufficient_text,
        });

        Ok(analysis)
    }

    fn should_use_pdf_path(&self, latest_text: &Option<crate::model::BillText>) -> bool {
        match latest_text {
            Some(text) => text.is_binary && text.content_type.eq_ignore_ascii_case("application/pdf") && self.model.supports_vision(),
            None => false,
        }
    }

    /// Text content source with the spec's fallback: decoded text, or
    /// `bill.description` when no usable text is available.
    fn select_text_source(&self, bill: &Bill, latest_text: Option<&crate::model::BillText>) -> String {
        match latest_text {
            Some(text) if !text.content.is_empty() => text.content.as_text_lossy(),
            _ => bill.description.clone(),
        }
    }

    async fn analyze_pdf(&self, bill: &Bill, text: &crate::model::BillText) -> Result<StructuredAnalysis> {
        let bytes = match &text.content {
            BillContent::Binary(bytes) => bytes.as_slice(),
            BillContent::Text(_) => return Err(PolicyPulseError::ContentProcessing("expected binary PDF content".into())),
        };
        let prompt = build_analysis_prompt(bill);
        let value = self
            .model
            .structured_completion_with_pdf(bytes, &prompt, &AnalysisSchema::structured_analysis(), &ModelOptions::default())
            .await?;
        StructuredAnalysis::from_value(&value).ok_or_else(|| PolicyPulseError::ContentProcessing("pdf analysis returned invalid schema".into()))
    }

    async fn analyze_text(&self, bill: &Bill, text: &str) -> Result<StructuredAnalysis> {
        let tokens = self.token_counter.count(text);
        if tokens < MIN_TOKENS_FOR_ANALYSIS {
            return Ok(StructuredAnalysis::insufficient_text());
        }

        if tokens > self.max_context_tokens {
            return self.analyze_chunked(bill, text).await;
        }

        self.call_model(bill, text).await
    }

    async fn analyze_chunked(&self, bill: &Bill, text: &str) -> Result<StructuredAnalysis> {
        let base_budget = self.max_context_tokens.saturating_sub(self.safety_buffer);
        // The fallback chars/4 heuristic under- or over-counts real tokens, so
        // an extra 20% margin is carved out of the budget while it's in effect
        // (spec §4.1).
        let budget = if self.token_counter.is_fallback() {
            let margin = ((base_budget as f64) * 0.2).ceil() as usize;
            base_budget.saturating_sub(margin).max(1)
        } else {
            base_budget.max(1)
        };
        let chunker = Chunker::new(&self.token_counter);
        let (chunks, has_structure) = chunker.chunk(text, budget);

        report_progress(ProgressEvent::ChunkingStarted {
            bill_id: bill.id,
            total_tokens: self.token_counter.count(text),
            chunk_count: chunks.len(),
            has_structure,
        });

        if chunks.len() == 1 {
            return self.call_model(bill, &chunks[0]).await;
        }

        let total_chunks = chunks.len();
        let mut analyses = Vec::with_capacity(total_chunks);
        for (index, chunk) in chunks.iter().enumerate() {
            let result = self.call_model(bill, chunk).await;
            report_progress(ProgressEvent::ChunkProcessed {
                bill_id: bill.id,
                chunk_index: index,
                total_chunks,
                success: result.is_ok(),
            });
            if let Ok(analysis) = result {
                analyses.push(analysis);
            }
        }

        if analyses.is_empty() {
            return Err(PolicyPulseError::ContentProcessing("no chunk produced a valid analysis".into()));
        }

        let meta = MergeMetadata {
            title: &bill.title,
            bill_number: &bill.bill_number,
            chunks_analyzed: analyses.len(),
        };
        let merged = MergeEngine::merge(&analyses, &meta, has_structure)
            .ok_or_else(|| PolicyPulseError::ContentProcessing("merge produced no result".into()))?;

        report_progress(ProgressEvent::MergeCompleted {
            bill_id: bill.id,
            chunk_count: analyses.len(),
        });

        Ok(merged)
    }

    async fn call_model(&self, bill: &Bill, text: &str) -> Result<StructuredAnalysis> {
        let prompt = build_analysis_prompt(bill);
        let messages = vec![ChatMessage::system(prompt), ChatMessage::user(text.to_string())];
        let value = self
            .model
            .structured_completion(&messages, &AnalysisSchema::structured_analysis(), &ModelOptions::default())
            .await?;
        StructuredAnalysis::from_value(&value).ok_or_else(|| PolicyPulseError::ContentProcessing("model returned invalid schema".into()))
    }

    /// Re-runs C4 RelevanceScorer against the bill's title/description
    /// (spec §4.10 step 7); mirrors `BillStore::recompute_priority`.
    async fn recompute_priority(&self, bill: &Bill) -> Result<()> {
        let scores = self.relevance_scorer.score(&bill.title, &bill.description);
        let existing = self.persistence.get_priority(bill.id).await?;
        let priority = Priority {
            bill_id: bill.id,
            public_health_relevance: scores.public_health_relevance,
            local_gov_relevance: scores.local_gov_relevance,
            overall_priority: scores.overall_priority,
            auto_categorized: scores.auto_categories.health || scores.auto_categories.local_gov,
            auto_categories: AutoCategories {
                health: scores.auto_categories.health,
                local_gov: scores.auto_categories.local_gov,
            },
            notification_sent: existing.map(|p| p.notification_sent).unwrap_or(false),
        };
        self.persistence.upsert_priority(priority).await
    }

    async fn persist_analysis_and_priority(&self, analysis: &Analysis, bill: &Bill) -> Result<()> {
        self.persistence.insert_analysis(analysis.clone()).await?;
        self.recompute_priority(bill).await
    }

    /// Batch entry point (spec §4.10): bounded concurrency, per-item
    /// isolation, cooperative cancellation.
    pub async fn analyze_batch_async(&self, bill_ids: &[Uuid], max_concurrent: usize, cancel: &CancellationToken) -> BatchSummary {
        let started = Instant::now();
        let max_concurrent = max_concurrent.max(1);

        let results: Vec<(Uuid, Result<Analysis>)> = stream::iter(bill_ids.iter().copied())
            .map(|bill_id| async move {
                if cancel.is_cancelled() {
                    return (bill_id, Err(PolicyPulseError::Cancelled));
                }
                let result = self.analyze_async(bill_id).await;
                (bill_id, result)
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        let mut success_count = 0usize;
        let mut failures = Vec::new();
        for (bill_id, result) in results {
            match result {
                Ok(_) => success_count += 1,
                Err(err) => failures.push(BatchFailure {
                    bill_id,
                    error: err.to_string(),
                }),
            }
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        let total = success_count + failures.len();
        let avg_per_item = if total == 0 { 0.0 } else { duration_seconds / total as f64 };

        report_progress(ProgressEvent::BatchCompleted {
            success_count,
            failure_count: failures.len(),
            duration_seconds,
        });

        BatchSummary {
            success_count,
            failure_count: failures.len(),
            duration_seconds,
            avg_per_item,
            failures,
        }
    }
}

/// Builds the system prompt instructing the model on the expected
/// schema and the insufficient-text marker (spec §4.10).
fn build_analysis_prompt(bill: &Bill) -> String {
    format!(
        "Analyze the legislative bill \"{}\" ({}) and return a JSON object matching the structured analysis schema. \
         If the provided content is too sparse to analyze, return \"INSUFFICIENT_TEXT_FOR_ANALYSIS\" as the summary.",
        bill.title, bill.bill_number
    )
}
