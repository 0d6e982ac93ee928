mod content_item;
mod credential;
mod prompt;
mod summary;

pub use content_item::{ContentItem, ContentType, ItemStatus, Page};
pub use credential::{ApiKey, NewApiKey, ProviderKind};
pub use prompt::SystemPrompt;
pub use summary::{EditKind, NewSummaryEdit, SummarizationResult, SummaryEdit};
