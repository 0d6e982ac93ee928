use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{NewApiKey, ProviderKind};
use crate::services::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bearer token required to submit URLs and change settings.
    pub api_token: Option<String>,

    /// Run extraction and summarization right after a URL is accepted.
    #[serde(default = "default_process_on_submit")]
    pub process_on_submit: bool,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub summarization: SummarizationConfig,

    #[serde(default)]
    pub providers: ProviderEndpoints,

    /// Credentials inserted at startup when the store has none.
    #[serde(default)]
    pub seed_api_keys: Vec<SeedApiKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub min_article_chars: usize,
    /// Caption languages in order of preference.
    pub caption_languages: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            request_timeout_secs: 15,
            min_article_chars: 100,
            caption_languages: vec!["ko".to_string(), "en".to_string()],
        }
    }
}

impl ExtractionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub rate_limit_pause_ms: u64,
    pub request_timeout_secs: u64,
    pub max_input_chars: usize,
    pub gemini_model: String,
    pub openai_model: String,
    pub anthropic_model: String,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1000,
            rate_limit_pause_ms: 2000,
            request_timeout_secs: 60,
            max_input_chars: 100_000,
            gemini_model: "gemini-1.5-pro".to_string(),
            openai_model: "gpt-4o".to_string(),
            anthropic_model: "claude-3-5-haiku-20241022".to_string(),
        }
    }
}

impl SummarizationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_millis(self.rate_limit_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub gemini_base_url: String,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedApiKey {
    pub provider: ProviderKind,
    pub key: String,
    #[serde(default)]
    pub priority_order: i64,
}

impl From<SeedApiKey> for NewApiKey {
    fn from(seed: SeedApiKey) -> Self {
        NewApiKey {
            provider: seed.provider,
            key: seed.key,
            priority_order: seed.priority_order,
            is_active: true,
        }
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("content-digest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("content.db").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_process_on_submit() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            api_token: None,
            process_on_submit: default_process_on_submit(),
            extraction: ExtractionConfig::default(),
            summarization: SummarizationConfig::default(),
            providers: ProviderEndpoints::default(),
            seed_api_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Read the config at `path`, writing a default one there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("content-digest")
            .join("config.toml")
    }
}
