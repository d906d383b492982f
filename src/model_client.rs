//! C7 ModelClient (spec §4.7): the language-model contract, a JSON
//! recovery chain for malformed completions, and the retry/backoff
//! wrapper the core uses around any concrete implementation.
//!
//! The recovery chain (direct parse → fenced block → balanced-brace
//! extraction → empty object) mirrors the teacher's `Resolver` JSON
//! repair strategy (see `benches/resolver.rs`'s clean/fenced/malformed
//! response shapes), adapted from an array-of-extractions shape to a
//! single analysis object. Retry/backoff is grounded on
//! `original_source/app/ai_analysis/openai_core.py`.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use crate::error::{PolicyPulseError, Result};
use crate::logging::{report_progress, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Opaque handle naming the response schema; the concrete
/// implementation decides how to encode it (JSON schema, function
/// call, etc.) — the core only needs to pass it through.
#[derive(Debug, Clone)]
pub struct AnalysisSchema {
    pub name: &'static str,
}

impl AnalysisSchema {
    pub fn structured_analysis() -> Self {
        Self {
            name: "structured_analysis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub temperature: f32,
    pub reasoning_effort: Option<String>,
    pub max_completion_tokens: Option<u32>,
    pub store: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            reasoning_effort: None,
            max_completion_tokens: None,
            store: false,
        }
    }
}

/// The marker returned by PDF extraction when no text could be pulled
/// from either engine (spec §4.7).
pub const PDF_NO_TEXT_MARKER: &str = "[PDF contains no extractable text]";

/// The language-model contract (spec §1 collaborator iii, §4.7).
/// Implemented outside this crate; the core only depends on this trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn supports_vision(&self) -> bool;

    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        schema: &AnalysisSchema,
        options: &ModelOptions,
    ) -> Result<serde_json::Value>;

    async fn structured_completion_with_pdf(
        &self,
        pdf_bytes: &[u8],
        prompt: &str,
        schema: &AnalysisSchema,
        options: &ModelOptions,
    ) -> Result<serde_json::Value>;
}

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Recovers a JSON object from a raw model completion, per spec §4.7:
/// direct parse, then fenced-code-block extraction, then a
/// regex-balanced `{...}` scan, then an empty object.
pub fn recover_json(raw: &str) -> serde_json::Value {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        if value.is_object() {
            return value;
        }
    }

    if let Some(captures) = FENCED_JSON.captures(raw) {
        if let Some(inner) = captures.get(1) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(inner.as_str()) {
                if value.is_object() {
                    return value;
                }
            }
        }
    }

    if let Some(balanced) = extract_first_balanced_braces(raw) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&balanced) {
            if value.is_object() {
                return value;
            }
        }
    }

    serde_json::Value::Object(serde_json::Map::new())
}

/// Scans for the first top-level balanced `{...}` substring, tracking
/// brace depth and skipping braces inside string literals.
fn extract_first_balanced_braces(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|&c| c == '{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &c) in chars[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(chars[start..end].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

/// Retry/backoff wrapper around a concrete `ModelClient` (spec §4.7:
/// `maxRetries` default 3, exponential with base 1.0s).
pub struct RetryingModelClient<C: ModelClient> {
    inner: C,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl<C: ModelClient> RetryingModelClient<C> {
    pub fn new(inner: C, max_retries: u32, retry_base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            retry_base_delay,
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    let delay = self.retry_base_delay.mul_f64(2f64.powi(attempt as i32));
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
impl<C: ModelClient> ModelClient for RetryingModelClient<C> {
    fn supports_vision(&self) -> bool {
        self.inner.supports_vision()
    }

    async fn structured_completion(
        &self,
        messages: &[ChatMessage],
        schema: &AnalysisSchema,
        options: &ModelOptions,
    ) -> Result<serde_json::Value> {
        self.with_retry("structured_completion", || {
            self.inner.structured_completion(messages, schema, options)
        })
        .await
    }

    async fn structured_completion_with_pdf(
        &self,
        pdf_bytes: &[u8],
        prompt: &str,
        schema: &AnalysisSchema,
        options: &ModelOptions,
    ) -> Result<serde_json::Value> {
        self.with_retry("structured_completion_with_pdf", || {
            self.inner.structured_completion_with_pdf(pdf_bytes, prompt, schema, options)
        })
        .await
    }
}

/// Extracts text from PDF bytes via a two-engine fallback (spec §4.7):
/// layout-preserving first, then page-by-page; empty extraction yields
/// `PDF_NO_TEXT_MARKER`. Implemented externally per
/// `examples/original_source/app/ai_analysis/pdf_handler.py`'s
/// two-library fallback; the core only defines the trait and order.
pub trait PdfTextExtractor: Send + Sync {
    fn extract(&self, pdf_bytes: &[u8]) -> Result<String>;
}

/// Runs `primary` then `fallback`, returning the marker string if both
/// produce empty text.
pub fn extract_pdf_text(
    pdf_bytes: &[u8],
    primary: &dyn PdfTextExtractor,
    fallback: &dyn PdfTextExtractor,
) -> Result<String> {
    if let Ok(text) = primary.extract(pdf_bytes) {
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    match fallback.extract(pdf_bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        _ => Ok(PDF_NO_TEXT_MARKER.to_string()),
    }
}
