//! Application configuration loaded once at startup.
//!
//! A single [`AppConfig`] is read from `config.yaml` and handed by reference
//! to every collaborator constructor. Secrets live in a flat
//! `credentials` mapping; a name missing from the file falls back to an
//! environment variable of the same name.
//!
//! ```yaml
//! llm:
//!   api_base: https://dashscope.aliyuncs.com/compatible-mode/v1
//!   model: qwen-plus
//! credentials:
//!   DASHSCOPE_API_KEY: sk-...
//!   NEWSAPI_KEY: ...
//!   SERPAPI_KEY: ...
//! ```

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub news: NewsConfig,
    pub extractor: ExtractorConfig,
    pub search: SearchConfig,
    pub render: RenderConfig,
    pub credentials: Credentials,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub api_key_name: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "qwen-plus".to_string(),
            temperature: 0.0,
            timeout_secs: 90,
            api_key_name: "DASHSCOPE_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub api_key_name: String,
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            api_key_name: "NEWSAPI_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Content extraction. Without `reader_base` pages are fetched and
/// stripped locally.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub reader_base: Option<String>,
    pub api_key_name: String,
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            reader_base: None,
            api_key_name: "READER_API_KEY".to_string(),
            max_chars: 25_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub engine: String,
    pub hl: String,
    pub gl: String,
    pub api_key_name: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://serpapi.com/search".to_string(),
            engine: "google".to_string(),
            hl: "zh-cn".to_string(),
            gl: "cn".to_string(),
            api_key_name: "SERPAPI_KEY".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub webdriver_url: String,
    pub documents_dir: String,
    pub images_dir: String,
    pub settle_delay_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            documents_dir: "data/KG".to_string(),
            images_dir: "serp_png_results".to_string(),
            settle_delay_ms: 4_000,
            window_width: 1000,
            window_height: 1600,
            timeout_secs: 60,
        }
    }
}

impl RenderConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Flat name to secret mapping.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.keys().map(|k| format!("{k}=<redacted>")))
            .finish()
    }
}

impl Credentials {
    #[cfg(test)]
    pub fn insert(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.0.insert(name.into(), secret.into());
    }

    /// Resolve a secret by name: config file first, then the environment.
    pub fn resolve(&self, name: &str) -> Result<String> {
        if let Some(secret) = self.0.get(name).filter(|s| !s.trim().is_empty()) {
            return Ok(secret.clone());
        }
        match std::env::var(name) {
            Ok(secret) if !secret.trim().is_empty() => Ok(secret),
            _ => Err(PipelineError::MissingCredential(name.to_string())),
        }
    }

    /// Like [`Credentials::resolve`], for services that work without a key.
    pub fn optional(&self, name: &str) -> Option<String> {
        self.resolve(name).ok()
    }
}

/// Load configuration from a YAML file.
///
/// A missing file is not an error: defaults are used and every secret must
/// come from the environment.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Config file not found; using defaults");
        return Ok(AppConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config = parse_config(&raw)?;
    info!(model = %config.llm.model, api_base = %config.llm.api_base, "Loaded configuration");
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let config: AppConfig = serde_yaml::from_str(raw)?;
    if config.extractor.max_chars == 0 {
        return Err(PipelineError::Config(
            "extractor.max_chars must be greater than zero".to_string(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let raw = r#"
llm:
  model: qwen-turbo
credentials:
  DASHSCOPE_API_KEY: sk-test
"#;
        let config = parse_config(raw).unwrap();
        assert_eq!(config.llm.model, "qwen-turbo");
        assert_eq!(config.llm.timeout_secs, 90);
        assert_eq!(config.extractor.max_chars, 25_000);
        assert_eq!(config.render.documents_dir, "data/KG");
        assert_eq!(config.credentials.resolve("DASHSCOPE_API_KEY").unwrap(), "sk-test");
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.search.engine, "google");
        assert_eq!(config.render.settle_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_zero_max_chars_rejected() {
        let raw = "extractor:\n  max_chars: 0\n";
        assert!(matches!(parse_config(raw), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_missing_credential() {
        let creds = Credentials::default();
        let err = creds
            .resolve("NEWS_PIPELINE_TEST_SURELY_UNSET_KEY")
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential(name) if name == "NEWS_PIPELINE_TEST_SURELY_UNSET_KEY"));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let mut creds = Credentials::default();
        creds.insert("SERPAPI_KEY", "super-secret");
        let printed = format!("{creds:?}");
        assert!(printed.contains("SERPAPI_KEY"));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("/definitely/not/here/config.yaml").unwrap();
        assert_eq!(config.news.base_url, "https://newsapi.org/v2");
    }
}
