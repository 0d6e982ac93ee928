use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of source a content item was submitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "youtube")]
    Video,
    #[serde(rename = "article")]
    Article,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "youtube",
            ContentType::Article => "article",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" | "video" => Ok(ContentType::Video),
            "article" => Ok(ContentType::Article),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Processing state, kept under `metadata.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "processing" => Some(ItemStatus::Processing),
            "completed" => Some(ItemStatus::Completed),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub original_url: String,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub original_content: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn status(&self) -> ItemStatus {
        self.metadata
            .get("status")
            .and_then(Value::as_str)
            .and_then(ItemStatus::parse)
            .unwrap_or_default()
    }

    pub fn channel_or_site(&self) -> Option<&str> {
        self.metadata.get("channel_or_site").and_then(Value::as_str)
    }

    /// Stored original text, if extraction produced any.
    pub fn source_text(&self) -> Option<&str> {
        self.original_content
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// One page of a listing plus the number of rows matching overall.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
