mod prompt;
mod providers;
mod summarizer;

pub use prompt::{truncate_chars, user_message, DEFAULT_SYSTEM_PROMPT};
pub use providers::{
    classify_failure, http_providers, AnthropicProvider, GeminiProvider, Generation,
    OpenAiProvider, Provider, ProviderError, ProviderErrorKind,
};
pub use summarizer::{ProviderStatus, SummarizeError, Summarizer};
