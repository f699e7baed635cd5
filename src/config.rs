use std::env;
use std::time::Duration;

use anyhow::Result;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (PALISADE_HOST, default 127.0.0.1)
    pub host: String,
    /// Server port (PALISADE_PORT, default 50051)
    pub port: u16,

    /// OpenAI-compatible endpoint base URL (PALISADE_LLM_URL)
    pub llm_base_url: String,
    /// API key for the LLM endpoint (OPENAI_API_KEY)
    pub llm_api_key: String,
    /// Model name (PALISADE_LLM_MODEL)
    pub llm_model: String,
    /// Per-call LLM timeout in milliseconds (PALISADE_LLM_TIMEOUT_MS)
    pub llm_timeout_ms: u64,

    /// Report cache TTL in seconds (PALISADE_CACHE_TTL_SECS)
    pub cache_ttl_secs: u64,
    /// Report cache max entries, FIFO-evicted (PALISADE_CACHE_MAX_SIZE)
    pub cache_max_size: usize,

    /// Overall per-request analysis deadline in ms (PALISADE_ANALYSIS_TIMEOUT_MS).
    /// Exceeding it yields a partial report, never an error.
    pub analysis_timeout_ms: u64,

    /// Abstention thresholds per analyzer (0.0-1.0). Scores below the
    /// threshold produce no finding.
    pub phishing_threshold: f64,
    pub malware_threshold: f64,
    pub privacy_threshold: f64,

    /// Retained-report ring size for aggregate queries (PALISADE_MAX_REPORTS)
    pub max_reports: usize,
    /// Per-subscriber stream queue capacity (PALISADE_STREAM_CAPACITY)
    pub stream_capacity: usize,

    /// Crate version, reported by the health check.
    pub version: String,
}

impl Config {
    /// Load configuration from environment variables. Every field has a
    /// default; only LLM augmentation requires a key to be set.
    pub fn load() -> Result<Self> {
        Ok(Self {
            host: env::var("PALISADE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PALISADE_PORT", 50051)?,
            llm_base_url: env::var("PALISADE_LLM_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            llm_model: env::var("PALISADE_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_timeout_ms: parse_env("PALISADE_LLM_TIMEOUT_MS", 20_000)?,
            cache_ttl_secs: parse_env("PALISADE_CACHE_TTL_SECS", 3600)?,
            cache_max_size: parse_env("PALISADE_CACHE_MAX_SIZE", 1000)?,
            analysis_timeout_ms: parse_env("PALISADE_ANALYSIS_TIMEOUT_MS", 10_000)?,
            phishing_threshold: parse_env("PALISADE_PHISHING_THRESHOLD", 0.3)?,
            malware_threshold: parse_env("PALISADE_MALWARE_THRESHOLD", 0.3)?,
            privacy_threshold: parse_env("PALISADE_PRIVACY_THRESHOLD", 0.3)?,
            max_reports: parse_env("PALISADE_MAX_REPORTS", 1000)?,
            stream_capacity: parse_env("PALISADE_STREAM_CAPACITY", 100)?,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Whether the optional LLM path is configured at all.
    pub fn llm_configured(&self) -> bool {
        !self.llm_api_key.is_empty()
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for Config {
    /// Defaults only — ignores the environment. Used by tests so an
    /// ambient OPENAI_API_KEY never changes test behavior.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_timeout_ms: 20_000,
            cache_ttl_secs: 3600,
            cache_max_size: 1000,
            analysis_timeout_ms: 10_000,
            phishing_threshold: 0.3,
            malware_threshold: 0.3,
            privacy_threshold: 0.3,
            max_reports: 1000,
            stream_capacity: 100,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key}={value}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 50051);
        assert_eq!(config.cache_max_size, 1000);
        assert!(!config.llm_configured());
        assert_eq!(config.analysis_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn parse_env_rejects_garbage() {
        std::env::set_var("PALISADE_TEST_PORT_GARBAGE", "not-a-number");
        let result: Result<u16> = parse_env("PALISADE_TEST_PORT_GARBAGE", 1);
        assert!(result.is_err());
        std::env::remove_var("PALISADE_TEST_PORT_GARBAGE");
    }
}
