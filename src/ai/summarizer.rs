use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, SummarizationConfig};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{ApiKey, ProviderKind, SummarizationResult};
use crate::services::{retry_with_backoff_if, RetryPolicy};

use super::prompt::{truncate_chars, DEFAULT_SYSTEM_PROMPT};
use super::providers::{http_providers, Provider, ProviderError, ProviderErrorKind};

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("text to summarize is empty")]
    EmptyInput,

    #[error("no active API keys configured; add one in settings")]
    NoKeys,

    #[error("all configured API keys failed: {}", describe_failures(.0))]
    AllFailed(Vec<ProviderError>),

    #[error("failed to load summarizer settings: {0}")]
    Store(#[from] AppError),
}

impl SummarizeError {
    pub fn code(&self) -> &'static str {
        match self {
            SummarizeError::EmptyInput => "EMPTY_INPUT",
            SummarizeError::NoKeys => "NO_KEYS",
            SummarizeError::AllFailed(_) => "ALL_FAILED",
            SummarizeError::Store(_) => "STORE_ERROR",
        }
    }
}

fn describe_failures(failures: &[ProviderError]) -> String {
    if failures.is_empty() {
        return "no usable provider".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A configured credential as shown on the settings page.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: i64,
    pub provider: String,
    pub priority_order: i64,
    pub is_active: bool,
    pub supported: bool,
}

/// Summarizes text by walking the stored credentials in priority order until
/// one provider answers.
pub struct Summarizer {
    repository: Repository,
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    retry: RetryPolicy,
    rate_limit_pause: Duration,
    max_input_chars: usize,
}

impl Summarizer {
    pub fn new(repository: Repository, config: &Config) -> Result<Self> {
        let providers = http_providers(&config.summarization, &config.providers)?;
        Ok(Self::with_providers(repository, providers, &config.summarization))
    }

    pub fn with_providers(
        repository: Repository,
        providers: Vec<Arc<dyn Provider>>,
        config: &SummarizationConfig,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.kind(), provider))
            .collect();

        Self {
            repository,
            providers,
            retry: config.retry_policy(),
            rate_limit_pause: config.rate_limit_pause(),
            max_input_chars: config.max_input_chars,
        }
    }

    /// The instruction to use: an explicit override, else the stored current
    /// prompt, else the built-in default.
    pub async fn system_prompt(&self, prompt_override: Option<&str>) -> Result<String> {
        if let Some(prompt) = prompt_override.map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(prompt.to_string());
        }

        Ok(self
            .repository
            .current_system_prompt()
            .await?
            .map(|p| p.prompt_text)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()))
    }

    pub async fn summarize(
        &self,
        text: &str,
        prompt_override: Option<&str>,
    ) -> std::result::Result<SummarizationResult, SummarizeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizeError::EmptyInput);
        }

        let (prompt, keys) = tokio::join!(
            self.system_prompt(prompt_override),
            self.repository.active_api_keys()
        );
        let prompt = prompt.unwrap_or_else(|e| {
            tracing::warn!("Failed to load system prompt, using default: {}", e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        });
        let keys = keys?;
        if keys.is_empty() {
            return Err(SummarizeError::NoKeys);
        }

        let content = truncate_chars(text, self.max_input_chars);
        if content.len() < text.len() {
            tracing::debug!("Input truncated to {} characters", self.max_input_chars);
        }

        let mut failures = Vec::new();
        for key in &keys {
            let Some(provider) = self.provider_for(key) else {
                continue;
            };

            tracing::info!(
                "Summarizing with {} (key {}, priority {})",
                key.provider,
                key.id,
                key.priority_order
            );

            let secret = key.secret();
            let outcome = retry_with_backoff_if(
                self.retry,
                || provider.generate(&secret, &prompt, content),
                ProviderError::is_retryable,
            )
            .await;

            match outcome {
                Ok(generation) => {
                    tracing::info!(
                        "Summary generated by {} ({})",
                        provider.kind(),
                        generation.model
                    );
                    return Ok(SummarizationResult {
                        summary: generation.text,
                        provider_used: provider.kind().to_string(),
                        tokens_used: generation.tokens_used,
                    });
                }
                Err(e) => {
                    tracing::warn!("Key {} failed: {}", key.id, e);
                    let rate_limited = e.kind == ProviderErrorKind::RateLimit;
                    failures.push(e);
                    if rate_limited {
                        tokio::time::sleep(self.rate_limit_pause).await;
                    }
                }
            }
        }

        Err(SummarizeError::AllFailed(failures))
    }

    pub async fn provider_status(&self) -> Result<Vec<ProviderStatus>> {
        let keys = self.repository.all_api_keys().await?;
        Ok(keys
            .into_iter()
            .map(|key| ProviderStatus {
                supported: self.provider_for(&key).is_some(),
                id: key.id,
                provider: key.provider,
                priority_order: key.priority_order,
                is_active: key.is_active,
            })
            .collect())
    }

    fn provider_for(&self, key: &ApiKey) -> Option<&Arc<dyn Provider>> {
        let kind = match key.provider.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!("Skipping key {}: {}", key.id, e);
                return None;
            }
        };
        let provider = self.providers.get(&kind);
        if provider.is_none() {
            tracing::warn!("Skipping key {}: no client for {}", key.id, kind);
        }
        provider
    }
}
