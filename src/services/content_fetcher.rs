use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::ContentType;

use super::extractor::{fetch_text, ExtractedContent, ExtractionError};
use super::retry::RetryPolicy;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const TEXT_WIDTH: usize = 120;

/// Elements that never carry article text.
const STRIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "canvas", "iframe", "form",
    "button", "nav", "header", "footer", "aside",
];

/// Class/id fragments that mark ads and overlays.
const NOISE_MARKERS: &[&str] = &["advert", "sidebar", "popup", "modal", "cookie-banner"];

/// Fetches web articles and reduces them to Markdown-style text.
pub struct ArticleFetcher {
    client: Client,
    retry: RetryPolicy,
    min_chars: usize,
}

impl ArticleFetcher {
    pub fn new(client: Client, retry: RetryPolicy, min_chars: usize) -> Self {
        Self {
            client,
            retry,
            min_chars,
        }
    }

    pub async fn fetch(&self, url: &Url) -> Result<ExtractedContent, ExtractionError> {
        let html = fetch_text(&self.client, self.retry, url.as_str(), HTML_ACCEPT).await?;
        if html.trim().is_empty() {
            return Err(ExtractionError::ParseFailed("page returned no HTML".to_string()));
        }

        let host = url.host_str().unwrap_or_default();
        let document = Html::parse_document(&html);
        let title = extract_title(&document).unwrap_or_else(|| host.to_string());
        let content = html_to_markdown(document)?;

        let length = content.chars().count();
        if length < self.min_chars {
            tracing::debug!("Extracted content too short ({} chars)", length);
            return Err(ExtractionError::ParseFailed(format!(
                "only {} characters of text found",
                length
            )));
        }

        Ok(ExtractedContent {
            content,
            title,
            channel_or_site: site_label(host),
            content_type: ContentType::Article,
        })
    }
}

pub(crate) fn site_label(host: &str) -> String {
    host.trim_start_matches("www.").to_string()
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|title| !title.is_empty())
}

/// Strip non-content elements and render what is left as Markdown-style
/// text.
pub fn html_to_markdown(mut document: Html) -> Result<String, ExtractionError> {
    let noise: Vec<_> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(is_noise)
        .map(|element| element.id())
        .collect();
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let cleaned = document.html();
    let text = html2text::from_read(cleaned.as_bytes(), TEXT_WIDTH)
        .map_err(|e| ExtractionError::ParseFailed(e.to_string()))?;

    Ok(collapse_blank_lines(&text))
}

fn is_noise(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if STRIPPED_TAGS.contains(&value.name()) {
        return true;
    }

    let markers = value
        .attr("class")
        .into_iter()
        .chain(value.attr("id"))
        .map(str::to_ascii_lowercase);

    for marker in markers {
        let words = marker
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty());
        for word in words {
            if word == "ad" || word == "ads" {
                return true;
            }
        }
        if NOISE_MARKERS.iter().any(|noise| marker.contains(noise)) {
            return true;
        }
    }

    false
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
            out.push("");
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out.join("\n").trim().to_string()
}
