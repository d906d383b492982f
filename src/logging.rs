//! Logging and progress reporting for the sync and analysis engines.
//!
//! Adapted from the extraction-pipeline progress system: a
//! `ProgressEvent` enum plus pluggable `ProgressHandler`s so library
//! consumers can route lifecycle events into their own observability
//! stack, while a `tracing`/`log`-backed handler is provided for the
//! common case.

use std::sync::Arc;

/// Lifecycle events emitted by `SyncEngine` and `AnalysisEngine`.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A sync run started for a run type.
    SyncStarted { run_id: String, run_type: String },
    /// A jurisdiction's session list was fetched.
    SessionsDiscovered {
        jurisdiction: String,
        session_count: usize,
    },
    /// A master list diff found a changed bill id.
    BillChangeDetected { bill_id: i64, session_id: i64 },
    /// A bill was persisted via `BillStore::upsert_bill`.
    BillUpserted { bill_id: i64, is_new: bool },
    /// A per-bill sync error was recorded but the run continues.
    SyncErrorRecorded { bill_id: Option<i64>, message: String },
    /// A sync run finished.
    SyncCompleted {
        run_id: String,
        status: String,
        new_bills: u32,
        updated_bills: u32,
    },
    /// The analysis cache was hit for a bill id.
    CacheHit { bill_id: uuid::Uuid },
    /// Text was chunked for analysis.
    ChunkingStarted {
        bill_id: uuid::Uuid,
        total_tokens: usize,
        chunk_count: usize,
        has_structure: bool,
    },
    /// A single chunk finished processing (success or failure).
    ChunkProcessed {
        bill_id: uuid::Uuid,
        chunk_index: usize,
        total_chunks: usize,
        success: bool,
    },
    /// Per-chunk analyses were merged into one.
    MergeCompleted { bill_id: uuid::Uuid, chunk_count: usize },
    /// An analysis was persisted.
    AnalysisPersisted {
        bill_id: uuid::Uuid,
        version: i32,
        insufficient_text: bool,
    },
    /// A batch analysis run finished.
    BatchCompleted {
        success_count: usize,
        failure_count: usize,
        duration_seconds: f64,
    },
    /// An outbound call is being retried after a failure.
    RetryAttempt {
        operation: String,
        attempt: u32,
        max_attempts: u32,
        delay_seconds: f64,
    },
    /// An operation failed terminally.
    Error { operation: String, error: String },
    /// Free-form debug detail, only surfaced by verbose handlers.
    Debug { operation: String, details: String },
}

/// Trait for handling progress events.
pub trait ProgressHandler: Send + Sync {
    fn handle_progress(&self, event: ProgressEvent);
}

/// Handler that routes every event through the `tracing` facade.
pub struct TracingProgressHandler {
    pub show_debug: bool,
}

impl TracingProgressHandler {
    pub fn new() -> Self {
        Self { show_debug: false }
    }

    pub fn verbose() -> Self {
        Self { show_debug: true }
    }
}

impl Default for TracingProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for TracingProgressHandler {
    fn handle_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::SyncStarted { run_id, run_type } => {
                tracing::info!(run_id, run_type, "sync run started");
            }
            ProgressEvent::SessionsDiscovered {
                jurisdiction,
                session_count,
            } => {
                tracing::info!(jurisdiction, session_count, "sessions discovered");
            }
            ProgressEvent::BillChangeDetected { bill_id, session_id } => {
                tracing::debug!(bill_id, session_id, "bill change detected");
            }
            ProgressEvent::BillUpserted { bill_id, is_new } => {
                tracing::debug!(bill_id, is_new, "bill upserted");
            }
            ProgressEvent::SyncErrorRecorded { bill_id, message } => {
                tracing::warn!(?bill_id, message, "sync error recorded");
            }
            ProgressEvent::SyncCompleted {
                run_id,
                status,
                new_bills,
                updated_bills,
            } => {
                tracing::info!(run_id, status, new_bills, updated_bills, "sync run completed");
            }
            ProgressEvent::CacheHit { bill_id } => {
                if self.show_debug {
                    tracing::debug!(%bill_id, "analysis cache hit");
                }
            }
            ProgressEvent::ChunkingStarted {
                bill_id,
                total_tokens,
                chunk_count,
                has_structure,
            } => {
                tracing::info!(%bill_id, total_tokens, chunk_count, has_structure, "chunking started");
            }
            ProgressEvent::ChunkProcessed {
                bill_id,
                chunk_index,
                total_chunks,
                success,
            } => {
                if self.show_debug {
                    tracing::debug!(%bill_id, chunk_index, total_chunks, success, "chunk processed");
                }
            }
            ProgressEvent::MergeCompleted { bill_id, chunk_count } => {
                tracing::debug!(%bill_id, chunk_count, "chunk analyses merged");
            }
            ProgressEvent::AnalysisPersisted {
                bill_id,
                version,
                insufficient_text,
            } => {
                tracing::info!(%bill_id, version, insufficient_text, "analysis persisted");
            }
            ProgressEvent::BatchCompleted {
                success_count,
                failure_count,
                duration_seconds,
            } => {
                tracing::info!(success_count, failure_count, duration_seconds, "batch analysis completed");
            }
            ProgressEvent::RetryAttempt {
                operation,
                attempt,
                max_attempts,
                delay_seconds,
            } => {
                tracing::warn!(operation, attempt, max_attempts, delay_seconds, "retrying");
            }
            ProgressEvent::Error { operation, error } => {
                tracing::error!(operation, error, "operation failed");
            }
            ProgressEvent::Debug { operation, details } => {
                if self.show_debug {
                    tracing::debug!(operation, details, "debug");
                }
            }
        }
    }
}

/// Handler that discards every event; useful for tests.
pub struct SilentProgressHandler;

impl ProgressHandler for SilentProgressHandler {
    fn handle_progress(&self, _event: ProgressEvent) {}
}

static PROGRESS_HANDLER: std::sync::OnceLock<Arc<dyn ProgressHandler>> = std::sync::OnceLock::new();

/// Install a process-wide progress handler. Only the first call takes effect.
pub fn init_progress_handler(handler: Arc<dyn ProgressHandler>) {
    let _ = PROGRESS_HANDLER.set(handler);
}

fn get_progress_handler() -> Arc<dyn ProgressHandler> {
    PROGRESS_HANDLER
        .get_or_init(|| Arc::new(TracingProgressHandler::new()))
        .clone()
}

pub fn report_progress(event: ProgressEvent) {
    get_progress_handler().handle_progress(event);
}
