#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use content_digest::ai::{Generation, Provider, ProviderError, ProviderErrorKind, Summarizer};
use content_digest::config::SummarizationConfig;
use content_digest::db::Repository;
use content_digest::models::{ContentType, NewApiKey, ProviderKind};
use content_digest::services::{ExtractedContent, ExtractionError, Extractor};

type Script = dyn Fn(&str, usize) -> Result<String, ProviderErrorKind> + Send + Sync;

/// Provider whose answers are scripted per API key and attempt number.
pub struct FakeProvider {
    kind: ProviderKind,
    script: Box<Script>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(
        kind: ProviderKind,
        script: impl Fn(&str, usize) -> Result<String, ProviderErrorKind> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with `text`.
    pub fn answering(kind: ProviderKind, text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::new(kind, move |_, _| Ok(text.clone()))
    }

    /// API keys passed to `generate`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate(
        &self,
        api_key: &str,
        system_prompt: &str,
        _content: &str,
    ) -> Result<Generation, ProviderError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(api_key.to_string());
            calls.iter().filter(|k| k.as_str() == api_key).count()
        };
        self.prompts.lock().unwrap().push(system_prompt.to_string());

        (self.script)(api_key, attempt)
            .map(|text| Generation {
                text,
                model: "fake-model".to_string(),
                tokens_used: Some(42),
            })
            .map_err(|kind| ProviderError::new(kind, self.kind, format!("{} rejected", api_key)))
    }
}

/// Extractor that returns canned content per URL.
#[derive(Default)]
pub struct FakeExtractor {
    pages: HashMap<String, Result<ExtractedContent, ExtractionError>>,
}

impl FakeExtractor {
    pub fn with_article(mut self, url: &str, title: &str, content: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(ExtractedContent {
                content: content.to_string(),
                title: title.to_string(),
                channel_or_site: "example.com".to_string(),
                content_type: ContentType::Article,
            }),
        );
        self
    }

    pub fn with_failure(mut self, url: &str, error: ExtractionError) -> Self {
        self.pages.insert(url.to_string(), Err(error));
        self
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent, ExtractionError> {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(ExtractionError::FetchFailed(format!("HTTP 404 for {}", url))))
    }
}

/// Fast retry and pause settings so tests do not sleep for seconds.
pub fn fast_config() -> SummarizationConfig {
    SummarizationConfig {
        base_delay_ms: 1,
        rate_limit_pause_ms: 30,
        ..SummarizationConfig::default()
    }
}

pub fn summarizer(repository: &Repository, providers: Vec<Arc<dyn Provider>>) -> Arc<Summarizer> {
    Arc::new(Summarizer::with_providers(
        repository.clone(),
        providers,
        &fast_config(),
    ))
}

pub async fn add_key(repository: &Repository, provider: ProviderKind, key: &str, priority_order: i64) -> i64 {
    repository
        .insert_api_key(NewApiKey {
            provider,
            key: key.to_string(),
            priority_order,
            is_active: true,
        })
        .await
        .unwrap()
}
