use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LLM vendors the summarizer knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// A stored provider credential. `key_encrypted` is base64 of the secret.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: i64,
    pub provider: String,
    pub key_encrypted: String,
    pub priority_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Decode the stored secret, falling back to the raw value for keys that
    /// were stored as plain text.
    pub fn secret(&self) -> String {
        STANDARD
            .decode(self.key_encrypted.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| self.key_encrypted.clone())
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.trim().parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApiKey {
    pub provider: ProviderKind,
    pub key: String,
    #[serde(default)]
    pub priority_order: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewApiKey {
    pub fn encoded_key(&self) -> String {
        STANDARD.encode(self.key.trim())
    }
}
