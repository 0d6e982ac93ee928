use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::models::{ContentItem, ContentType, ItemStatus, Page};
use crate::services::video_id;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Limit/offset taken leniently from the query string. Unparseable values
/// fall back to the defaults; the limit is clamped to `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl Paging {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let number = |key: &str| params.get(key).and_then(|v| v.trim().parse::<i64>().ok());

        Self {
            limit: number("limit").unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: number("offset").unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub original_url: String,
    pub content_type: ContentType,
    pub channel_or_site: String,
    pub status: ItemStatus,
    pub provider_used: Option<String>,
    pub error: Option<String>,
    pub tags: Vec<String>,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

impl ItemView {
    pub fn summary_of(item: ContentItem) -> Self {
        let meta = |key: &str| {
            item.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Self {
            id: item.id.to_string(),
            title: item
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            summary: item
                .summary
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "No summary available".to_string()),
            channel_or_site: item.channel_or_site().unwrap_or("Unknown").to_string(),
            status: item.status(),
            provider_used: meta("provider_used"),
            error: meta("error"),
            thumbnail: thumbnail(&item),
            original_url: item.original_url,
            content_type: item.content_type,
            tags: item.tags,
            created_at: item.created_at,
            updated_at: item.updated_at,
            original_content: None,
        }
    }

    pub fn detail_of(item: ContentItem) -> Self {
        let original_content = item.original_content.clone();
        Self {
            original_content,
            ..Self::summary_of(item)
        }
    }
}

fn thumbnail(item: &ContentItem) -> Option<String> {
    if item.content_type != ContentType::Video {
        return None;
    }
    let url = Url::parse(&item.original_url).ok()?;
    video_id(&url).map(|id| format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub data: Vec<ItemView>,
    pub count: usize,
    pub total: i64,
    pub has_more: bool,
    pub query: Option<String>,
}

impl ListResponse {
    pub fn new(page: Page<ContentItem>, paging: Paging, query: Option<String>) -> Self {
        let data: Vec<ItemView> = page.items.into_iter().map(ItemView::summary_of).collect();
        let count = data.len();
        Self {
            has_more: paging.offset + (count as i64) < page.total,
            data,
            count,
            total: page.total,
            query,
        }
    }
}
