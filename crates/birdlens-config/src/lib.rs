//! # Birdlens Config
//!
//! Single-file YAML configuration for birdlens. One `birdlens.yaml` covers
//! the Twitter API transport, the planner LLM, and logging. Credentials are
//! never stored in the file; each section names the environment variable its
//! key is read from.

mod loader;

pub use loader::{load_config, load_config_or_default, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema for birdlens.
#[derive(Debug, Clone, Deserialize)]
pub struct BirdlensConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for BirdlensConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            planner: PlannerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Twitter API transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// RapidAPI host header value.
    #[serde(default = "default_host")]
    pub host: String,
    /// Optional base URL override. Derived from `host` when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Page budget used when a plan step does not declare `max_pages`.
    #[serde(default = "default_max_pages_fallback")]
    pub max_pages_fallback: u32,
    /// Delay between successive page fetches of one step.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Environment variable holding the RapidAPI key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_pages_fallback: default_max_pages_fallback(),
            page_delay_ms: default_page_delay_ms(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ApiConfig {
    /// Base URL for requests, defaulting to `https://<host>`.
    pub fn resolve_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!("https://{}", self.host),
        }
    }

    /// Resolve the RapidAPI key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ApiKeyError> {
        resolve_key_from_env(&self.api_key_env)
    }
}

fn default_host() -> String {
    "twitter-api45.p.rapidapi.com".to_string()
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_max_pages_fallback() -> u32 {
    3
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_api_key_env() -> String {
    "RAPIDAPI_KEY".to_string()
}

/// Planner LLM settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Environment variable holding the Gemini API key.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
    /// Path to the endpoint catalog injected into the planner prompt.
    #[serde(default = "default_endpoints_file")]
    pub endpoints_file: String,
    /// Path to the ontology/synonym sheet injected into the planner prompt.
    #[serde(default = "default_ontology_file")]
    pub ontology_file: String,
    /// Character budget for conversation history in the planner prompt.
    #[serde(default = "default_history_char_budget")]
    pub history_char_budget: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            api_key_env: default_gemini_key_env(),
            endpoints_file: default_endpoints_file(),
            ontology_file: default_ontology_file(),
            history_char_budget: default_history_char_budget(),
        }
    }
}

impl PlannerConfig {
    /// Resolve the Gemini API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ApiKeyError> {
        resolve_key_from_env(&self.api_key_env)
    }
}

fn default_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}

fn default_temperature() -> f32 {
    0.05
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_endpoints_file() -> String {
    "merged_endpoints.json".to_string()
}

fn default_ontology_file() -> String {
    "ontology.md".to_string()
}

fn default_history_char_budget() -> usize {
    // ~800k tokens at roughly four characters per token.
    3_200_000
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Errors related to API key resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiKeyError {
    #[error("API key environment variable not configured")]
    NotConfigured,
    #[error("Environment variable '{0}' not found")]
    EnvNotFound(String),
}

fn resolve_key_from_env(env_name: &str) -> Result<String, ApiKeyError> {
    if env_name.trim().is_empty() {
        return Err(ApiKeyError::NotConfigured);
    }
    std::env::var(env_name).map_err(|_| ApiKeyError::EnvNotFound(env_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_remote_api() {
        let config = BirdlensConfig::default();
        assert_eq!(config.api.host, "twitter-api45.p.rapidapi.com");
        assert_eq!(config.api.timeout_secs, 45);
        assert_eq!(config.api.max_pages_fallback, 3);
        assert_eq!(config.api.page_delay_ms, 500);
        assert_eq!(config.planner.model, "gemini-1.5-pro-latest");
        assert!((config.planner.temperature - 0.05).abs() < f32::EPSILON);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_base_url_derived_from_host() {
        let config = ApiConfig::default();
        assert_eq!(
            config.resolve_base_url(),
            "https://twitter-api45.p.rapidapi.com"
        );
    }

    #[test]
    fn test_base_url_override_wins() {
        let config = ApiConfig {
            base_url: Some("https://proxy.example.com/twitter".to_string()),
            ..ApiConfig::default()
        };
        assert_eq!(config.resolve_base_url(), "https://proxy.example.com/twitter");
    }

    #[test]
    fn test_resolve_api_key_reads_env() {
        let config = ApiConfig {
            api_key_env: "BIRDLENS_TEST_RAPIDAPI_KEY".to_string(),
            ..ApiConfig::default()
        };
        std::env::set_var("BIRDLENS_TEST_RAPIDAPI_KEY", "k-123");
        let key = config.resolve_api_key();
        std::env::remove_var("BIRDLENS_TEST_RAPIDAPI_KEY");
        assert_eq!(key.unwrap(), "k-123");
    }

    #[test]
    fn test_resolve_api_key_missing_env() {
        let config = ApiConfig {
            api_key_env: "BIRDLENS_TEST_UNSET_KEY".to_string(),
            ..ApiConfig::default()
        };
        std::env::remove_var("BIRDLENS_TEST_UNSET_KEY");
        assert!(matches!(
            config.resolve_api_key(),
            Err(ApiKeyError::EnvNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_api_key_blank_env_name() {
        let config = ApiConfig {
            api_key_env: "  ".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            config.resolve_api_key(),
            Err(ApiKeyError::NotConfigured)
        ));
    }
}
