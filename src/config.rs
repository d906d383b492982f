//! Typed configuration for the PolicyPulse core (spec §6 "configuration-injected" values).
//!
//! Loaded from environment via `dotenvy` + `config`, with the defaults
//! named in spec §6. Validation bounds follow
//! `original_source/app/ai_analysis/config.py`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be at least {min}, got {value}")]
    TooLow {
        field: &'static str,
        min: i64,
        value: i64,
    },
    #[error("{field} must be at most {max}, got {value}")]
    TooHigh {
        field: &'static str,
        max: i64,
        value: i64,
    },
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Configuration consumed by the core engines. Secrets
/// (`UPSTREAM_API_KEY`, `MODEL_API_KEY`, `DATABASE_URL`) are carried
/// opaquely; the core never parses or validates their shape, only
/// that they're present when required by the collaborator that uses
/// them.
#[derive(Debug, Clone)]
pub struct PolicyPulseConfig {
    pub upstream_api_key: Option<String>,
    pub model_api_key: Option<String>,
    pub database_url: Option<String>,
    pub cache_ttl: Duration,
    pub max_context_tokens: usize,
    pub safety_buffer: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub monitored_jurisdictions: Vec<String>,
}

impl Default for PolicyPulseConfig {
    fn default() -> Self {
        Self {
            upstream_api_key: None,
            model_api_key: None,
            database_url: None,
            cache_ttl: Duration::from_secs(30 * 60),
            max_context_tokens: 120_000,
            safety_buffer: 20_000,
            max_retries: 3,
            retry_base_delay: Duration::from_secs_f64(1.0),
            rate_limit_delay: Duration::from_secs_f64(1.0),
            monitored_jurisdictions: vec!["US".to_string(), "TX".to_string()],
        }
    }
}

impl PolicyPulseConfig {
    /// Load configuration from the process environment, applying a
    /// `.env` file first if present (mirrors the teacher's `dotenvy`
    /// usage pattern).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        cfg.upstream_api_key = std::env::var("UPSTREAM_API_KEY").ok();
        cfg.model_api_key = std::env::var("MODEL_API_KEY").ok();
        cfg.database_url = std::env::var("DATABASE_URL").ok();

        if let Some(v) = read_int("CACHE_TTL_MINUTES")? {
            cfg.cache_ttl = Duration::from_secs((v.max(0) as u64) * 60);
        }
        if let Some(v) = read_int("MAX_CONTEXT_TOKENS")? {
            bounds_i64("max_context_tokens", v, 1_000, 1_000_000)?;
            cfg.max_context_tokens = v as usize;
        }
        if let Some(v) = read_int("SAFETY_BUFFER")? {
            bounds_i64("safety_buffer", v, 0, i64::MAX)?;
            cfg.safety_buffer = v as usize;
        }
        if let Some(v) = read_int("MAX_RETRIES")? {
            bounds_i64("max_retries", v, 0, 10)?;
            cfg.max_retries = v as u32;
        }
        if let Some(v) = read_f64("RETRY_BASE_DELAY")? {
            if v <= 0.0 || v > 10.0 {
                return Err(ConfigError::Invalid {
                    field: "retry_base_delay",
                    source: format!("must be in (0, 10], got {v}").into(),
                });
            }
            cfg.retry_base_delay = Duration::from_secs_f64(v);
        }
        if let Some(v) = read_f64("RATE_LIMIT_DELAY")? {
            if v < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "rate_limit_delay",
                    source: "must be non-negative".into(),
                });
            }
            cfg.rate_limit_delay = Duration::from_secs_f64(v);
        }
        if let Ok(raw) = std::env::var("MONITORED_JURISDICTIONS") {
            let parsed: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                cfg.monitored_jurisdictions = parsed;
            }
        }

        Ok(cfg)
    }

    pub fn require_upstream_api_key(&self) -> Result<&str, ConfigError> {
        self.upstream_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("UPSTREAM_API_KEY"))
    }

    pub fn require_model_api_key(&self) -> Result<&str, ConfigError> {
        self.model_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("MODEL_API_KEY"))
    }
}

fn read_int(name: &'static str) -> Result<Option<i64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                field: name,
                source: Box::new(e),
            }),
        Err(_) => Ok(None),
    }
}

fn read_f64(name: &'static str) -> Result<Option<f64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                field: name,
                source: Box::new(e),
            }),
        Err(_) => Ok(None),
    }
}

fn bounds_i64(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooLow { field, min, value });
    }
    if value > max {
        return Err(ConfigError::TooHigh { field, max, value });
    }
    Ok(())
}
