//! C6 UpstreamClient (spec §4.6): the external legislative-data
//! provider contract, plus the rate-limited/retrying wrapper the core
//! uses around any concrete implementation.
//!
//! `UpstreamClient` is the seam an external collaborator implements
//! (spec §1 collaborator ii); `RateLimitedUpstreamClient` is the
//! non-functional contract enforced on top of it (minimum call
//! spacing, retry/backoff, rate-limit detection), grounded on
//! `original_source/app/legiscan/api.py`'s `_rate_limit`/`make_request`
//! pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PolicyPulseError, Result};
use crate::logging::{report_progress, ProgressEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: i64,
    pub session_name: String,
    pub year_start: i32,
    pub year_end: i32,
    pub sine_die: i32,
}

/// One entry of `getMasterListRaw`, keyed by string position; key `"0"`
/// is metadata and is excluded from this map (spec §4.9 step c).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterListEntry {
    pub bill_id: i64,
    pub change_hash: String,
}

pub type MasterListRaw = std::collections::HashMap<String, MasterListEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsorDetail {
    pub people_id: Option<i64>,
    pub name: String,
    pub role: Option<String>,
    pub district: Option<String>,
    pub party: Option<String>,
    pub sponsor_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDetail {
    pub doc_id: i64,
    pub version: i32,
    #[serde(rename = "type")]
    pub text_type: String,
    pub date: Option<String>,
    pub mime_id: Option<i32>,
    pub text_hash: Option<String>,
    pub state_link: Option<String>,
    /// Base64-encoded inline content, present on some text entries.
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmendmentDetail {
    /// Absent for malformed upstream entries; such entries are skipped
    /// during mapping rather than stored with a synthetic id (spec §4.8).
    pub amendment_id: Option<i64>,
    pub date: Option<String>,
    pub adopted: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub amendment_hash: Option<String>,
    pub state_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub session_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDetail {
    pub bill_id: i64,
    pub state: String,
    pub bill_number: String,
    pub title: String,
    pub description: String,
    pub status: Option<i32>,
    pub status_date: Option<String>,
    pub introduced_date: Option<String>,
    pub last_action_date: Option<String>,
    pub session: SessionRef,
    #[serde(default)]
    pub sponsors: Vec<SponsorDetail>,
    #[serde(default)]
    pub texts: Vec<TextDetail>,
    #[serde(default)]
    pub amendments: Vec<AmendmentDetail>,
    pub url: Option<String>,
    pub state_link: Option<String>,
    pub change_hash: Option<String>,
}

/// `getBillText` result: either decoded text or raw bytes, as returned
/// by the upstream provider for a given `docId`.
#[derive(Debug, Clone)]
pub enum TextPayload {
    Text(String),
    Binary(Vec<u8>),
}

/// The external legislative-data provider contract (spec §1
/// collaborator ii, §4.6). Implemented outside this crate; the core
/// only depends on this trait.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn session_list(&self, state: &str) -> Result<Vec<Session>>;
    async fn master_list_raw(&self, session_id: i64) -> Result<MasterListRaw>;
    async fn bill(&self, bill_id: i64) -> Result<BillDetail>;
    async fn bill_text(&self, doc_id: i64) -> Result<TextPayload>;
    async fn search_raw(&self, state: &str, query: &str, year: Option<i32>) -> Result<serde_json::Value>;
    async fn fetch_url(&self, url: &str) -> Result<(Vec<u8>, Option<String>)>;
}

/// Non-functional wrapper enforcing spec §4.6's contract: minimum
/// spacing between calls, exponential backoff on error, and a
/// steeper backoff when the upstream signals rate limiting.
pub struct RateLimitedUpstreamClient<C: UpstreamClient> {
    inner: C,
    min_spacing: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    last_call: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl<C: UpstreamClient> RateLimitedUpstreamClient<C> {
    pub fn new(inner: C, min_spacing: Duration, max_retries: u32, retry_base_delay: Duration) -> Self {
        Self {
            inner,
            min_spacing,
            max_retries,
            retry_base_delay,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    async fn throttle(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(last) = *guard {
            let elapsed = Utc::now().signed_duration_since(last);
            if let Ok(elapsed) = elapsed.to_std() {
                if elapsed < self.min_spacing {
                    tokio::time::sleep(self.min_spacing - elapsed).await;
                }
            }
        }
        *guard = Some(Utc::now());
    }

    /// Runs `op`, retrying on retryable errors with exponential
    /// backoff (`2^attempt * retry_base_delay`), or `5 * 2^attempt`
    /// seconds when the failure looks like an upstream rate limit.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            self.throttle().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    let delay = if matches!(err, PolicyPulseError::RateLimit(_)) {
                        Duration::from_secs_f64(5.0 * 2f64.powi(attempt as i32))
                    } else {
                        self.retry_base_delay.mul_f64(2f64.powi(attempt as i32))
                    };
                    report_progress(ProgressEvent::RetryAttempt {
                        operation: operation.to_string(),
                        attempt: attempt + 1,
                        max_attempts: self.max_retries,
                        delay_seconds: delay.as_secs_f64(),
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<C: UpstreamClient> UpstreamClient for RateLimitedUpstreamClient<C> {
    async fn session_list(&self, state: &str) -> Result<Vec<Session>> {
        self.with_retry("session_list", || self.inner.session_list(state)).await
    }

    async fn master_list_raw(&self, session_id: i64) -> Result<MasterListRaw> {
        self.with_retry("master_list_raw", || self.inner.master_list_raw(session_id)).await
    }

    async fn bill(&self, bill_id: i64) -> Result<BillDetail> {
        self.with_retry("bill", || self.inner.bill(bill_id)).await
    }

    async fn bill_text(&self, doc_id: i64) -> Result<TextPayload> {
        self.with_retry("bill_text", || self.inner.bill_text(doc_id)).await
    }

    async fn search_raw(&self, state: &str, query: &str, year: Option<i32>) -> Result<serde_json::Value> {
        self.with_retry("search_raw", || self.inner.search_raw(state, query, year)).await
    }

    async fn fetch_url(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        self.with_retry("fetch_url", || self.inner.fetch_url(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl UpstreamClient for FlakyClient {
        async fn session_list(&self, _state: &str) -> Result<Vec<Session>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(PolicyPulseError::Api("transient".into()))
            } else {
                Ok(vec![])
            }
        }
        async fn master_list_raw(&self, _session_id: i64) -> Result<MasterListRaw> {
            Ok(MasterListRaw::new())
        }
        async fn bill(&self, bill_id: i64) -> Result<BillDetail> {
            Err(PolicyPulseError::NotFound(format!("bill {bill_id}")))
        }
        async fn bill_text(&self, _doc_id: i64) -> Result<TextPayload> {
            Ok(TextPayload::Text(String::new()))
        }
        async fn search_raw(&self, _state: &str, _query: &str, _year: Option<i32>) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn fetch_url(&self, _url: &str) -> Result<(Vec<u8>, Option<String>)> {
            Ok((vec![], None))
        }
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let client = RateLimitedUpstreamClient::new(
            FlakyClient {
                failures_before_success: 2,
                attempts: AtomicU32::new(0),
            },
            Duration::from_millis(0),
            3,
            Duration::from_millis(1),
        );
        let result = client.session_list("TX").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = RateLimitedUpstreamClient::new(
            FlakyClient {
                failures_before_success: 10,
                attempts: AtomicU32::new(0),
            },
            Duration::from_millis(0),
            2,
            Duration::from_millis(1),
        );
        let result = client.session_list("TX").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let client = RateLimitedUpstreamClient::new(
            FlakyClient {
                failures_before_success: 0,
                attempts: AtomicU32::new(0),
            },
            Duration::from_millis(0),
            3,
            Duration::from_millis(1),
        );
        let result = client.bill(42).await;
        assert!(matches!(result, Err(PolicyPulseError::NotFound(_))));
    }
}
