use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::models::ContentType;

use super::content_fetcher::ArticleFetcher;
use super::retry::RetryPolicy;
use super::youtube::TranscriptFetcher;

pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const VIDEO_HOSTS: [&str; 2] = ["youtube.com", "youtu.be"];

/// Text pulled out of a submitted URL, ready for summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedContent {
    pub content: String,
    pub title: String,
    pub channel_or_site: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("no transcript available: {0}")]
    NoTranscript(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("could not extract content: {0}")]
    ParseFailed(String),
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl ExtractionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExtractionError::InvalidUrl(_) => "INVALID_URL",
            ExtractionError::NoTranscript(_) => "NO_TRANSCRIPT",
            ExtractionError::FetchFailed(_) => "FETCH_FAILED",
            ExtractionError::ParseFailed(_) => "PARSE_FAILED",
            ExtractionError::Timeout(_) => "TIMEOUT",
        }
    }
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExtractionError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            ExtractionError::FetchFailed(format!("HTTP {}", status))
        } else {
            ExtractionError::FetchFailed(e.to_string())
        }
    }
}

/// Anything that can turn a URL into summarizable text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> std::result::Result<ExtractedContent, ExtractionError>;
}

/// Parse and classify a submitted URL. Only absolute http(s) URLs with a
/// host are accepted.
pub fn classify_url(raw: &str) -> std::result::Result<(Url, ContentType), ExtractionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExtractionError::InvalidUrl("URL is empty".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| ExtractionError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractionError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return Err(ExtractionError::InvalidUrl("URL has no host".to_string())),
    };

    let content_type = if VIDEO_HOSTS.iter().any(|video| host.contains(video)) {
        ContentType::Video
    } else {
        ContentType::Article
    };

    Ok((url, content_type))
}

/// Routes URLs to the transcript or article path.
pub struct ContentExtractor {
    articles: ArticleFetcher,
    transcripts: TranscriptFetcher,
}

impl ContentExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = build_client(config.request_timeout())?;
        let retry = config.retry_policy();

        Ok(Self {
            articles: ArticleFetcher::new(client.clone(), retry, config.min_article_chars),
            transcripts: TranscriptFetcher::new(client, retry, config.caption_languages.clone()),
        })
    }
}

#[async_trait]
impl Extractor for ContentExtractor {
    async fn extract(&self, url: &str) -> std::result::Result<ExtractedContent, ExtractionError> {
        let (parsed, content_type) = classify_url(url)?;
        tracing::info!("Extracting {} content from {}", content_type, parsed);

        match content_type {
            ContentType::Video => self.transcripts.fetch(&parsed).await,
            ContentType::Article => self.articles.fetch(&parsed).await,
        }
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(BROWSER_USER_AGENT)
        .redirect(Policy::limited(5))
        .cookie_store(true)
        .build()?;
    Ok(client)
}

/// GET a URL as text, mapping transport and status failures, with retry.
pub(crate) async fn fetch_text(
    client: &Client,
    retry: RetryPolicy,
    url: &str,
    accept: &'static str,
) -> std::result::Result<String, ExtractionError> {
    super::retry::retry_with_backoff(retry, || async {
        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::ACCEPT_LANGUAGE, "ko-KR,ko;q=0.9,en;q=0.8")
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok::<_, ExtractionError>(body)
    })
    .await
}
