use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ProviderEndpoints, SummarizationConfig};
use crate::error::Result;
use crate::models::ProviderKind;

use super::prompt::user_message;

const TEMPERATURE: f32 = 0.3;
const TOP_P: f32 = 0.8;
const TOP_K: u32 = 40;
const MAX_OUTPUT_TOKENS: u32 = 2048;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    AuthFailed,
    QuotaExceeded,
    Api,
}

impl ProviderErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimit => "RATE_LIMIT",
            ProviderErrorKind::AuthFailed => "AUTH_FAILED",
            ProviderErrorKind::QuotaExceeded => "QUOTA_EXCEEDED",
            ProviderErrorKind::Api => "API_ERROR",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider}: {message} ({kind})")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: ProviderKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider,
            message: message.into(),
        }
    }

    pub fn api(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Api, provider, message)
    }

    /// Only generic API failures are worth another attempt on the same key.
    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::Api
    }

    fn transport(provider: ProviderKind, e: reqwest::Error) -> Self {
        Self::api(provider, format!("request failed: {}", e))
    }
}

/// Text produced by one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub tokens_used: Option<u64>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate(
        &self,
        api_key: &str,
        system_prompt: &str,
        content: &str,
    ) -> std::result::Result<Generation, ProviderError>;
}

/// Build the HTTP-backed clients for every supported vendor.
pub fn http_providers(
    config: &SummarizationConfig,
    endpoints: &ProviderEndpoints,
) -> Result<Vec<Arc<dyn Provider>>> {
    let client = Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let gemini: Arc<dyn Provider> = Arc::new(GeminiProvider {
        client: client.clone(),
        base_url: endpoints.gemini_base_url.trim_end_matches('/').to_string(),
        model: config.gemini_model.clone(),
    });
    let openai: Arc<dyn Provider> = Arc::new(OpenAiProvider {
        client: client.clone(),
        base_url: endpoints.openai_base_url.trim_end_matches('/').to_string(),
        model: config.openai_model.clone(),
    });
    let anthropic: Arc<dyn Provider> = Arc::new(AnthropicProvider {
        client,
        base_url: endpoints.anthropic_base_url.trim_end_matches('/').to_string(),
        model: config.anthropic_model.clone(),
    });

    Ok(vec![gemini, openai, anthropic])
}

/// Map a non-success HTTP response onto the failover categories.
pub fn classify_failure(provider: ProviderKind, status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(body).unwrap_or_else(|| {
        let trimmed: String = body.chars().take(300).collect();
        format!("HTTP {}: {}", status.as_u16(), trimmed)
    });
    let lower = body.to_ascii_lowercase();

    let kind = if lower.contains("insufficient_quota")
        || lower.contains("exceeded your current quota")
        || lower.contains("quota exceeded")
        || lower.contains("credit balance")
    {
        ProviderErrorKind::QuotaExceeded
    } else if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("rate_limit") {
        ProviderErrorKind::RateLimit
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lower.contains("invalid_api_key")
        || lower.contains("api key not valid")
        || lower.contains("authentication_error")
    {
        ProviderErrorKind::AuthFailed
    } else {
        ProviderErrorKind::Api
    };

    ProviderError::new(kind, provider, message)
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    provider: ProviderKind,
    response: reqwest::Response,
) -> std::result::Result<T, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    if !status.is_success() {
        return Err(classify_failure(provider, status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::api(provider, format!("unexpected response: {}", e)))
}

fn non_empty(provider: ProviderKind, text: String) -> std::result::Result<String, ProviderError> {
    let text = text.trim();
    if text.is_empty() {
        Err(ProviderError::api(provider, "empty response"))
    } else {
        Ok(text.to_string())
    }
}

// Gemini

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    total_token_count: Option<u64>,
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(
        &self,
        api_key: &str,
        system_prompt: &str,
        content: &str,
    ) -> std::result::Result<Generation, ProviderError> {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_prompt.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart {
                    text: user_message(content),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.kind(), e))?;

        let body: GeminiResponse = read_json(self.kind(), response).await?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(Generation {
            text: non_empty(self.kind(), text)?,
            model: self.model.clone(),
            tokens_used: body.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

// OpenAI

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(
        &self,
        api_key: &str,
        system_prompt: &str,
        content: &str,
    ) -> std::result::Result<Generation, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message(content),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
            top_p: TOP_P,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.kind(), e))?;

        let body: ChatResponse = read_json(self.kind(), response).await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(Generation {
            text: non_empty(self.kind(), text)?,
            model: self.model.clone(),
            tokens_used: body.usage.and_then(|u| u.total_tokens),
        })
    }
}

// Anthropic

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessageUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn generate(
        &self,
        api_key: &str,
        system_prompt: &str,
        content: &str,
    ) -> std::result::Result<Generation, ProviderError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            system: system_prompt,
            messages: vec![ChatMessage {
                role: "user",
                content: user_message(content),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.kind(), e))?;

        let body: MessageResponse = read_json(self.kind(), response).await?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        let tokens_used = body.usage.map(|u| {
            u.input_tokens.unwrap_or_default() + u.output_tokens.unwrap_or_default()
        });

        Ok(Generation {
            text: non_empty(self.kind(), text)?,
            model: self.model.clone(),
            tokens_used,
        })
    }
}
