//! Error taxonomy for the PolicyPulse core.
//!
//! Kinds mirror the propagation policy in spec §7: upstream/model
//! clients surface only their terminal error after exhausting
//! retries, the persistence layer wraps and rolls back on any
//! failure, and the sync/analysis engines downgrade per-item failures
//! into recorded errors rather than propagating them.

use thiserror::Error;

/// Errors produced by the core engines and their external-collaborator
/// wrappers.
#[derive(Debug, Error)]
pub enum PolicyPulseError {
    /// Upstream or model rate limiting, surfaced only after retries are exhausted.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Upstream returned a non-OK status or malformed envelope.
    #[error("upstream api error: {0}")]
    Api(String),

    /// Content exceeds a hard ceiling on a path that disallows chunking.
    #[error("token limit exceeded: {0}")]
    TokenLimit(String),

    /// Chunking produced no valid analyses, or PDF extraction failed with no model fallback.
    #[error("content processing failed: {0}")]
    ContentProcessing(String),

    /// A persistence transaction rolled back; wraps the underlying cause.
    #[error("persistence error: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The requested bill id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl PolicyPulseError {
    pub fn persistence(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Box::new(source))
    }

    /// True for errors that UpstreamClient/ModelClient wrappers should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit(_) | Self::Api(_))
    }
}

impl From<reqwest::Error> for PolicyPulseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            PolicyPulseError::Api(format!("transient network error: {err}"))
        } else {
            PolicyPulseError::Api(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PolicyPulseError {
    fn from(err: serde_json::Error) -> Self {
        PolicyPulseError::ContentProcessing(format!("json error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, PolicyPulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(PolicyPulseError::RateLimit("x".into()).is_retryable());
        assert!(PolicyPulseError::Api("x".into()).is_retryable());
        assert!(!PolicyPulseError::NotFound("x".into()).is_retryable());
        assert!(!PolicyPulseError::Cancelled.is_retryable());
    }

    #[test]
    fn persistence_wraps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = PolicyPulseError::persistence(io_err);
        assert!(err.to_string().contains("persistence error"));
    }
}
