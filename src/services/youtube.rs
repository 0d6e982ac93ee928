use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::models::ContentType;

use super::extractor::{fetch_text, ExtractedContent, ExtractionError};
use super::retry::{retry_with_backoff, RetryPolicy};

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";
const DEFAULT_TITLE: &str = "YouTube Video";
const DEFAULT_CHANNEL: &str = "Unknown Channel";

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
}

/// Fetches caption transcripts and basic metadata for YouTube videos.
pub struct TranscriptFetcher {
    client: Client,
    retry: RetryPolicy,
    languages: Vec<String>,
    base_url: String,
}

impl TranscriptFetcher {
    pub fn new(client: Client, retry: RetryPolicy, languages: Vec<String>) -> Self {
        Self {
            client,
            retry,
            languages,
            base_url: YOUTUBE_BASE_URL.to_string(),
        }
    }

    /// Serve watch pages and oEmbed from another host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn fetch(&self, url: &Url) -> Result<ExtractedContent, ExtractionError> {
        let video_id = video_id(url).ok_or_else(|| {
            ExtractionError::InvalidUrl(format!("no YouTube video id in {}", url))
        })?;

        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        let page = fetch_text(&self.client, self.retry, &watch_url, "text/html").await?;

        let tracks = caption_tracks(&page);
        let track = choose_track(&tracks, &self.languages).ok_or_else(|| {
            ExtractionError::NoTranscript(format!(
                "video {} has no captions or they are not accessible",
                video_id
            ))
        })?;
        tracing::debug!(
            "Using {} captions ({}) for video {}",
            track.language_code,
            track.kind.as_deref().unwrap_or("manual"),
            video_id
        );

        let xml = fetch_text(&self.client, self.retry, &track.base_url, "text/xml").await?;
        let content = transcript_text(&xml);
        if content.is_empty() {
            return Err(ExtractionError::NoTranscript(format!(
                "captions for video {} are empty",
                video_id
            )));
        }

        let (title, channel) = self.metadata(url).await;

        Ok(ExtractedContent {
            content,
            title,
            channel_or_site: channel,
            content_type: ContentType::Video,
        })
    }

    /// Title and channel from oEmbed. Failures fall back to placeholders.
    async fn metadata(&self, url: &Url) -> (String, String) {
        let oembed_url = format!(
            "{}/oembed?url={}&format=json",
            self.base_url,
            urlencoding::encode(url.as_str())
        );

        let result = retry_with_backoff(self.retry, || async {
            let response = self
                .client
                .get(&oembed_url)
                .send()
                .await?
                .error_for_status()?;
            response.json::<OEmbed>().await
        })
        .await;

        match result {
            Ok(oembed) => (
                oembed
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                oembed
                    .author_name
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            ),
            Err(e) => {
                tracing::warn!("Failed to fetch YouTube metadata for {}: {}", url, e);
                (DEFAULT_TITLE.to_string(), DEFAULT_CHANNEL.to_string())
            }
        }
    }
}

/// Video id from watch, short-link, embed, legacy `/v/`, shorts and live URLs.
pub fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host.contains("youtu.be") {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed") | Some("v") | Some("shorts") | Some("live") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    };

    candidate.filter(|id| {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Caption tracks listed in the player response embedded in a watch page.
fn caption_tracks(page: &str) -> Vec<CaptionTrack> {
    let Some(start) = page.find("\"captionTracks\":") else {
        return Vec::new();
    };
    let rest = &page[start + "\"captionTracks\":".len()..];

    serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .and_then(|parsed| parsed.ok())
        .unwrap_or_default()
}

/// Pick the first track matching the preferred languages in order, else the
/// first track available. Manual captions win over generated ones.
fn choose_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    let matches_language = |track: &CaptionTrack, language: &str| {
        track.language_code == language
            || track
                .language_code
                .strip_prefix(language)
                .is_some_and(|rest| rest.starts_with('-'))
    };
    let is_generated = |track: &CaptionTrack| track.kind.as_deref() == Some("asr");

    for language in languages {
        let mut candidates = tracks.iter().filter(|t| matches_language(*t, language.as_str()));
        let first = candidates.next();
        if let Some(manual) = first
            .into_iter()
            .chain(candidates)
            .find(|t| !is_generated(*t))
        {
            return Some(manual);
        }
        if first.is_some() {
            return first;
        }
    }

    tracks.first()
}

/// Concatenate timed-text segments into one whitespace-normalized string.
fn transcript_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"text" => current = Some(String::new()),
            Ok(Event::End(e)) if e.name().as_ref() == b"text" => {
                if let Some(segment) = current.take() {
                    segments.push(decode_entities(&segment));
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(segment), Ok(text)) = (current.as_mut(), e.decode()) {
                    segment.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(segment) = current.as_mut() {
                    push_reference(segment, &e);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Timed-text parse stopped at byte {}: {}", reader.error_position(), e);
                break;
            }
        }
    }

    segments.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_reference(segment: &mut String, reference: &BytesRef<'_>) {
    if let Ok(Some(c)) = reference.resolve_char_ref() {
        segment.push(c);
        return;
    }
    if let Ok(name) = reference.decode() {
        match resolve_predefined_entity(&name) {
            Some(value) => segment.push_str(value),
            None => {
                segment.push('&');
                segment.push_str(&name);
                segment.push(';');
            }
        }
    }
}

/// Caption text arrives entity-encoded a second time (`&amp;#39;`).
fn decode_entities(text: &str) -> String {
    unescape_with(text, |entity| match entity {
        "nbsp" => Some(" "),
        other => resolve_predefined_entity(other),
    })
    .map(|decoded| decoded.into_owned())
    .unwrap_or_else(|_| text.to_string())
}
