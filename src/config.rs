//! Process configuration
//!
//! `AppConfig` is read once at startup. The orchestrator core only ever sees
//! the small per-component structs below, passed in explicitly.

use crate::error::OrchestrationError;
use crate::models::Intent;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;

/// Mutating or administrative words an access-query may never contain.
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate",
    "grant", "revoke", "exec", "execute", "call", "replace", "merge",
    "upsert", "copy", "load", "into", "outfile", "dumpfile", "vacuum",
    "reindex", "lock", "rename", "attach", "detach",
    // Postgres functions with side effects outside the query
    "pg_sleep", "pg_read_file", "pg_read_binary_file", "lo_import",
    "lo_export", "lo_create", "lo_unlink", "dblink", "pg_terminate_backend",
    "pg_cancel_backend", "pg_reload_conf", "pg_ls_dir",
    // Sequence, setting and lock functions that mutate from inside a SELECT
    "setval", "nextval", "set_config", "pg_advisory_lock",
    "pg_advisory_xact_lock", "pg_try_advisory_lock",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub forbidden_keywords: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            forbidden_keywords: DEFAULT_FORBIDDEN_KEYWORDS
                .iter()
                .map(|kw| kw.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Intent used when the model call fails or its label is unknown.
    /// `None` turns such failures into `ClassificationFailed`.
    pub fallback: Option<Intent>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback: Some(Intent::Data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub retrieval_top_k: usize,
    /// Upper bound on one whole request, measured from entry.
    pub request_deadline: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            retrieval_top_k: 5,
            request_deadline: None,
        }
    }
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub embedding_model: String,
    pub database_url: Option<String>,
    pub statement_timeout: Duration,
    pub api_port: u16,
    pub rate_limit: RateLimitConfig,
    pub validator: ValidatorConfig,
    pub classifier: ClassifierConfig,
    pub orchestrator: OrchestratorSettings,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let window_secs: u64 = parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 60)?;
        if window_secs == 0 {
            return Err(OrchestrationError::Configuration(
                "RATE_LIMIT_WINDOW_SECS must be greater than zero".to_string(),
            ));
        }

        let fallback = match get("CLASSIFIER_FALLBACK_INTENT") {
            None => Some(Intent::Data),
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(v.parse::<Intent>().map_err(|e| {
                OrchestrationError::Configuration(format!("CLASSIFIER_FALLBACK_INTENT: {}", e))
            })?),
        };

        let validator = match get("FORBIDDEN_KEYWORDS") {
            Some(list) => {
                let forbidden_keywords: Vec<String> = list
                    .split(',')
                    .map(|kw| kw.trim().to_lowercase())
                    .filter(|kw| !kw.is_empty())
                    .collect();
                if forbidden_keywords.is_empty() {
                    return Err(OrchestrationError::Configuration(
                        "FORBIDDEN_KEYWORDS must name at least one keyword".to_string(),
                    ));
                }
                ValidatorConfig { forbidden_keywords }
            }
            None => ValidatorConfig::default(),
        };

        let request_deadline = match get("REQUEST_TIMEOUT_SECS") {
            Some(_) => Some(Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 0)?)),
            None => None,
        };

        let api_port = match get("PORT") {
            Some(_) => parse_or(&get, "PORT", 8080)?,
            None => parse_or(&get, "API_PORT", 8080)?,
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            embedding_model: get("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-004".to_string()),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            statement_timeout: Duration::from_millis(parse_or(
                &get,
                "QUERY_STATEMENT_TIMEOUT_MS",
                5_000,
            )?),
            api_port,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(window_secs),
                max_requests: parse_or(&get, "MAX_REQUESTS_PER_MINUTE", 60)?,
            },
            validator,
            classifier: ClassifierConfig { fallback },
            orchestrator: OrchestratorSettings {
                retrieval_top_k: parse_or(&get, "RETRIEVAL_TOP_K", 5)?,
                request_deadline,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| {
            OrchestrationError::Configuration(format!("{}='{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
