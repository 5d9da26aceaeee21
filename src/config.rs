//! Process configuration loaded from the environment (and `.env`)
//!
//! The inference credential is mandatory: every binary calls
//! [`AnalystConfig::from_env`] before accepting work and exits if it fails.

use crate::error::AnalystError;
use crate::gemini::DEFAULT_MAX_IN_FLIGHT;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_NEWS_INDEX_PATH: &str = "vector_stores/news_index.json";
pub const DEFAULT_NEWS_TOP_K: usize = 4;
/// Upper bound for `INFERENCE_MAX_RETRIES`
pub const MAX_INFERENCE_RETRIES: u32 = 10;

/// Budgets for one research loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopLimits {
    /// Maximum number of REASON steps per query
    pub max_steps: u32,
    /// Budget for a single inference call or tool call
    pub step_timeout: Duration,
    /// Wall-clock budget for the whole query, synthesis included
    pub query_timeout: Duration,
    /// Abort after this many tool failures in a row (0 disables)
    pub max_consecutive_tool_failures: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_timeout: Duration::from_secs(120),
            query_timeout: Duration::from_secs(300),
            max_consecutive_tool_failures: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalystConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub embedding_model: String,
    pub gemini_base_url: String,
    pub market_data_base_url: String,
    pub news_index_path: PathBuf,
    pub news_min_score: f32,
    pub news_top_k: usize,
    pub limits: LoopLimits,
    pub inference_max_retries: u32,
    pub gemini_max_in_flight: usize,
    pub max_concurrent_queries: usize,
    pub api_port: u16,
}

impl AnalystConfig {
    /// Load `.env` then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini_api_key = get("GEMINI_API_KEY")
            .or_else(|| get("GOOGLE_API_KEY"))
            .ok_or_else(|| {
                AnalystError::ConfigError(
                    "GEMINI_API_KEY (or GOOGLE_API_KEY) not set".to_string(),
                )
            })?;

        let defaults = LoopLimits::default();
        let limits = LoopLimits {
            max_steps: parse_or(&get, "MAX_STEPS", defaults.max_steps)?,
            step_timeout: Duration::from_secs(parse_or(
                &get,
                "STEP_TIMEOUT_SECS",
                defaults.step_timeout.as_secs(),
            )?),
            query_timeout: Duration::from_secs(parse_or(
                &get,
                "QUERY_TIMEOUT_SECS",
                defaults.query_timeout.as_secs(),
            )?),
            max_consecutive_tool_failures: parse_or(
                &get,
                "MAX_CONSECUTIVE_TOOL_FAILURES",
                defaults.max_consecutive_tool_failures,
            )?,
        };

        if limits.max_steps == 0 {
            return Err(AnalystError::ConfigError(
                "MAX_STEPS must be at least 1".to_string(),
            ));
        }

        let inference_max_retries: u32 = parse_or(&get, "INFERENCE_MAX_RETRIES", 2)?;
        if inference_max_retries > MAX_INFERENCE_RETRIES {
            return Err(AnalystError::ConfigError(format!(
                "INFERENCE_MAX_RETRIES must be at most {}",
                MAX_INFERENCE_RETRIES
            )));
        }

        let api_port: u16 = match get("PORT") {
            Some(_) => parse_or(&get, "PORT", 8000)?,
            None => parse_or(&get, "API_PORT", 8000)?,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-pro".to_string()),
            embedding_model: get("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-004".to_string()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            market_data_base_url: get("MARKET_DATA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MARKET_DATA_BASE_URL.to_string()),
            news_index_path: get("NEWS_INDEX_PATH")
                .unwrap_or_else(|| DEFAULT_NEWS_INDEX_PATH.to_string())
                .into(),
            news_min_score: parse_or::<_, f32>(&get, "NEWS_MIN_SCORE", 0.3)?,
            news_top_k: parse_or::<_, usize>(&get, "NEWS_TOP_K", DEFAULT_NEWS_TOP_K)?.max(1),
            limits,
            inference_max_retries,
            gemini_max_in_flight: parse_or::<_, usize>(
                &get,
                "GEMINI_MAX_IN_FLIGHT",
                DEFAULT_MAX_IN_FLIGHT,
            )?
            .max(1),
            max_concurrent_queries: parse_or::<_, usize>(&get, "MAX_CONCURRENT_QUERIES", 4)?.max(1),
            api_port,
        })
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            AnalystError::ConfigError(format!("{} has invalid value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
