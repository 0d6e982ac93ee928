mod content_fetcher;
mod extractor;
mod retry;
mod youtube;

pub use content_fetcher::{html_to_markdown, ArticleFetcher};
pub use extractor::{classify_url, ContentExtractor, ExtractedContent, ExtractionError, Extractor};
pub use retry::{retry_with_backoff, retry_with_backoff_if, RetryPolicy};
pub use youtube::{video_id, TranscriptFetcher};
