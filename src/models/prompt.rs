use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub id: i64,
    pub prompt_text: String,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}
