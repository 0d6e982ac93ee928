use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    ManualEdit,
    Resummarize,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::ManualEdit => "manual_edit",
            EditKind::Resummarize => "resummarize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual_edit" => Some(EditKind::ManualEdit),
            "resummarize" => Some(EditKind::Resummarize),
            _ => None,
        }
    }
}

/// Append-only history entry for a content item's summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEdit {
    pub id: i64,
    pub content_item_id: i64,
    pub edit_type: EditKind,
    pub previous_content: Option<String>,
    pub new_content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSummaryEdit {
    pub content_item_id: i64,
    pub edit_type: EditKind,
    pub previous_content: Option<String>,
    pub new_content: String,
}

/// Output of a successful summarization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizationResult {
    pub summary: String,
    pub provider_used: String,
    pub tokens_used: Option<u64>,
}
