//! PolicyPulse core: incremental legislative bill sync and LLM-backed
//! impact analysis. See `README.md` for the external interfaces this
//! crate exposes to the surrounding application (persistence,
//! upstream data, and model implementations).

pub mod analysis_engine;
pub mod bill_store;
pub mod cache;
pub mod chunking;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod model;
pub mod model_client;
pub mod persistence;
pub mod relevance;
pub mod sanitizer;
pub mod schema;
pub mod sync_engine;
pub mod token_counter;
pub mod upstream_client;

pub use analysis_engine::{AnalysisEngine, BatchFailure, BatchSummary};
pub use bill_store::BillStore;
pub use cache::AnalysisCache;
pub use chunking::Chunker;
pub use config::{ConfigError, PolicyPulseConfig};
pub use error::{PolicyPulseError, Result};
pub use merge::{MergeEngine, MergeMetadata};
pub use model_client::{ModelClient, RetryingModelClient};
pub use persistence::{InMemorySession, PersistenceSession};
pub use relevance::RelevanceScorer;
pub use sanitizer::TextSanitizer;
pub use sync_engine::SyncEngine;
pub use token_counter::TokenCounter;
pub use upstream_client::{RateLimitedUpstreamClient, UpstreamClient};
