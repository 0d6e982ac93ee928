mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use content_digest::ai::{Provider, ProviderErrorKind};
use content_digest::db::Repository;
use content_digest::models::{ContentType, EditKind, ItemStatus, ProviderKind};
use content_digest::{build_router, AppState};

use common::{add_key, summarizer, FakeExtractor, FakeProvider};

const TOKEN: &str = "test-token";
const ARTICLE_URL: &str = "https://example.com/posts/ownership";

struct TestApp {
    router: Router,
    repo: Repository,
}

async fn app_with(provider: Arc<FakeProvider>, token: Option<&str>, process_on_submit: bool) -> TestApp {
    let repo = Repository::open_in_memory().await.unwrap();
    app_on(repo, provider, token, process_on_submit)
}

fn app_on(
    repo: Repository,
    provider: Arc<FakeProvider>,
    token: Option<&str>,
    process_on_submit: bool,
) -> TestApp {
    let extractor = FakeExtractor::default().with_article(
        ARTICLE_URL,
        "Ownership in Rust",
        "Each value has a single owner and is dropped when the owner goes out of scope.",
    );
    let state = AppState::new(
        repo.clone(),
        Arc::new(extractor),
        summarizer(&repo, vec![provider as Arc<dyn Provider>]),
        token.map(str::to_string),
    )
    .with_processing(process_on_submit);

    TestApp {
        router: build_router(state),
        repo,
    }
}

async fn app() -> TestApp {
    app_with(
        FakeProvider::answering(ProviderKind::Gemini, "Fresh summary"),
        Some(TOKEN),
        false,
    )
    .await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, body, token)).await
    }

    /// Insert an item that went through extraction and summarization.
    async fn completed_item(&self, url: &str, title: &str, summary: &str) -> i64 {
        let id = self
            .repo
            .insert_pending_item(url.to_string(), ContentType::Article)
            .await
            .unwrap();
        self.repo
            .record_extraction(id, title.to_string(), format!("Original text of {}", title), "example.com".to_string())
            .await
            .unwrap();
        self.repo
            .record_summary(id, summary.to_string(), "gemini".to_string())
            .await
            .unwrap();
        id
    }
}

fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn submission_requires_the_bearer_token() {
    let app = app().await;
    let body = json!({ "url": ARTICLE_URL });

    let (status, json) = app.post_json("/api/summaries", body.clone(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _) = app.post_json("/api/summaries", body.clone(), Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/api/summaries")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Basic {}", TOKEN))
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.repo.list_items(10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn unconfigured_token_rejects_every_submission() {
    let app = app_with(FakeProvider::answering(ProviderKind::Gemini, "x"), None, false).await;

    let (status, _) = app
        .post_json("/api/summaries", json!({ "url": ARTICLE_URL }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.repo.list_items(10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn accepted_submission_creates_pending_item() {
    let app = app().await;

    let (status, json) = app
        .post_json("/api/summaries", json!({ "url": "https://youtu.be/dQw4w9WgXcQ" }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "pending");
    assert!(json["message"].is_string());

    let id = json["id"].as_i64().unwrap();
    let item = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.content_type, ContentType::Video);
    assert_eq!(item.status(), ItemStatus::Pending);
    assert!(item.title.is_none());
    assert!(item.summary.is_none());
}

#[tokio::test]
async fn malformed_submissions_are_rejected() {
    let app = app().await;

    for body in [
        json!({ "url": "not a url" }),
        json!({ "url": "ftp://example.com/file" }),
        json!({ "url": 42 }),
        json!({ "link": ARTICLE_URL }),
    ] {
        let (status, json) = app.post_json("/api/summaries", body.clone(), Some(TOKEN)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert!(json["error"].is_string());
    }

    let request = Request::post("/api/summaries")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.repo.list_items(10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn submission_endpoint_only_accepts_post() {
    let app = app().await;
    let (status, _) = app.get("/api/summaries").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn submission_is_processed_in_the_background() {
    let provider = FakeProvider::answering(ProviderKind::Gemini, "Background summary");
    let app = app_with(provider, Some(TOKEN), true).await;
    add_key(&app.repo, ProviderKind::Gemini, "g-key", 1).await;

    let (status, json) = app
        .post_json("/api/summaries", json!({ "url": ARTICLE_URL }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = json["id"].as_i64().unwrap();

    let mut item = app.repo.get_item(id).await.unwrap().unwrap();
    for _ in 0..100 {
        if item.status() == ItemStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        item = app.repo.get_item(id).await.unwrap().unwrap();
    }

    assert_eq!(item.status(), ItemStatus::Completed);
    assert_eq!(item.title.as_deref(), Some("Ownership in Rust"));
    assert_eq!(item.summary.as_deref(), Some("Background summary"));
    assert!(app.repo.list_edits(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_pages_newest_first() {
    let app = app().await;
    for n in 1..=3 {
        app.completed_item(&format!("https://example.com/{}", n), &format!("Post {}", n), "Summary")
            .await;
    }

    let (status, json) = app.get("/api/content-items?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["total"], 3);
    assert_eq!(json["hasMore"], true);
    assert_eq!(json["data"][0]["title"], "Post 3");
    assert!(json["data"][0]["id"].is_string());

    let (_, json) = app.get("/api/content-items?limit=2&offset=2").await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["hasMore"], false);
    assert_eq!(json["data"][0]["title"], "Post 1");

    let (status, json) = app.get("/api/content-items?limit=abc&offset=-5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
}

#[tokio::test]
async fn search_matches_title_and_summary() {
    let app = app().await;
    app.completed_item("https://example.com/a", "Async Rust", "Futures and executors").await;
    app.completed_item("https://example.com/b", "Gardening", "Tomatoes like rust-free tools").await;
    app.completed_item("https://example.com/c", "Cooking", "Pasta").await;

    let (status, json) = app.get("/api/search?q=RUST").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["query"], "RUST");

    let (_, json) = app.get("/api/search?q=100%25").await;
    assert_eq!(json["count"], 0);

    let (_, json) = app.get("/api/search?q=").await;
    assert_eq!(json["total"], 3);
}

#[tokio::test]
async fn item_detail() {
    let app = app().await;
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Short summary").await;

    let (status, json) = app.get(&format!("/api/content-items/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["summary"], "Short summary");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["channel_or_site"], "example.com");
    assert_eq!(json["original_content"], "Original text of Ownership");

    let (status, json) = app.get("/api/content-items/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, _) = app.get("/api/content-items/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_edit_updates_summary_and_records_history() {
    let app = app().await;
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Old summary").await;
    let before = app.repo.get_item(id).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (status, json) = app
        .post_json(
            &format!("/api/content-items/{}/edit", id),
            json!({ "newContent": "  Edited summary  " }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"], "Edited summary");
    assert!(timestamp(&json["updated_at"]) > before.updated_at);

    let after = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(after.summary.as_deref(), Some("Edited summary"));

    let edits = app.repo.list_edits(id).await.unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].edit_type, EditKind::ManualEdit);
    assert_eq!(edits[0].previous_content.as_deref(), Some("Old summary"));
    assert_eq!(edits[0].new_content, "Edited summary");

    let (status, json) = app.get(&format!("/api/content-items/{}/edits", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["data"][0]["edit_type"], "manual_edit");
}

#[tokio::test]
async fn edit_succeeds_when_history_cannot_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.db");
    let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
    let app = app_on(
        repo,
        FakeProvider::answering(ProviderKind::Gemini, "Fresh summary"),
        Some(TOKEN),
        false,
    );
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Old summary").await;

    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE summary_edits;")
        .unwrap();

    let (status, json) = app
        .post_json(
            &format!("/api/content-items/{}/edit", id),
            json!({ "newContent": "Edited anyway" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"], "Edited anyway");

    let item = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.summary.as_deref(), Some("Edited anyway"));
    assert!(app.repo.list_edits(id).await.is_err());
}

#[tokio::test]
async fn invalid_edits_change_nothing() {
    let app = app().await;
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Old summary").await;
    let uri = format!("/api/content-items/{}/edit", id);

    for body in [json!({}), json!({ "newContent": "   " }), json!({ "newContent": 7 })] {
        let (status, _) = app.post_json(&uri, body.clone(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }

    let (status, _) = app
        .post_json("/api/content-items/999/edit", json!({ "newContent": "x" }), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let item = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.summary.as_deref(), Some("Old summary"));
    assert!(app.repo.list_edits(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn resummarize_without_original_content_is_rejected() {
    let app = app().await;
    add_key(&app.repo, ProviderKind::Gemini, "g-key", 1).await;
    let id = app
        .repo
        .insert_pending_item(ARTICLE_URL.to_string(), ContentType::Article)
        .await
        .unwrap();
    let before = app.repo.get_item(id).await.unwrap().unwrap();

    let (status, json) = app
        .post_json(&format!("/api/content-items/{}/resummarize", id), json!({}), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let after = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(after.summary, before.summary);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(app.repo.list_edits(id).await.unwrap().is_empty());

    let (status, _) = app
        .post_json("/api/content-items/999/resummarize", json!({}), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resummarize_replaces_summary() {
    let app = app().await;
    add_key(&app.repo, ProviderKind::Gemini, "g-key", 1).await;
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Old summary").await;

    let (status, json) = app
        .post_json(&format!("/api/content-items/{}/resummarize", id), json!({}), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"], "Fresh summary");
    assert_eq!(json["provider_used"], "gemini");

    let edits = app.repo.list_edits(id).await.unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].edit_type, EditKind::Resummarize);
    assert_eq!(edits[0].previous_content.as_deref(), Some("Old summary"));
    assert_eq!(edits[0].new_content, "Fresh summary");
}

#[tokio::test]
async fn failed_resummarize_leaves_item_untouched() {
    let provider = FakeProvider::new(ProviderKind::Gemini, |_, _| Err(ProviderErrorKind::AuthFailed));
    let app = app_with(provider, Some(TOKEN), false).await;
    add_key(&app.repo, ProviderKind::Gemini, "g-key", 1).await;
    let id = app.completed_item(ARTICLE_URL, "Ownership", "Old summary").await;

    let (status, json) = app
        .post_json(&format!("/api/content-items/{}/resummarize", id), json!({}), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("gemini"));

    let item = app.repo.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.summary.as_deref(), Some("Old summary"));
    assert!(app.repo.list_edits(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn prompt_settings() {
    let app = app().await;

    let (status, json) = app.get("/api/settings/prompt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_default"], true);

    let update = json!({ "prompt_text": "Summarize in three bullet points." });
    let (status, _) = app
        .send(json_request(Method::PUT, "/api/settings/prompt", update.clone(), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(json_request(Method::PUT, "/api/settings/prompt", json!({ "prompt_text": " " }), Some(TOKEN)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send(json_request(Method::PUT, "/api/settings/prompt", update, Some(TOKEN)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prompt_text"], "Summarize in three bullet points.");

    let (_, json) = app.get("/api/settings/prompt").await;
    assert_eq!(json["is_default"], false);
    assert_eq!(json["prompt_text"], "Summarize in three bullet points.");
}

#[tokio::test]
async fn api_key_settings_never_expose_secrets() {
    let app = app().await;
    let new_key = json!({ "provider": "openai", "key": "sk-very-secret", "priority_order": 2 });

    let (status, _) = app.post_json("/api/settings/api-keys", new_key.clone(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_json("/api/settings/api-keys", json!({ "provider": "mistral", "key": "x" }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app.post_json("/api/settings/api-keys", new_key, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["id"].as_i64().unwrap();

    let (status, json) = app.get("/api/settings/api-keys").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["provider"], "openai");
    assert_eq!(json["data"][0]["priority_order"], 2);
    assert!(!json.to_string().contains("sk-very-secret"));

    let stored = app.repo.all_api_keys().await.unwrap();
    assert_eq!(stored[0].secret(), "sk-very-secret");
    assert_ne!(stored[0].key_encrypted, "sk-very-secret");

    let delete = |token: Option<&str>| {
        let mut builder = Request::delete(format!("/api/settings/api-keys/{}", id));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    };
    let (status, _) = app.send(delete(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(delete(Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(delete(Some(TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_provider_names_are_case_insensitive() {
    let app = app().await;

    let (status, json) = app
        .post_json("/api/settings/api-keys", json!({ "provider": "OpenAI", "key": "sk-mixed" }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["provider"], "openai");

    let (status, json) = app
        .post_json("/api/settings/api-keys", json!({ "provider": "Claude", "key": "sk-alias" }), Some(TOKEN))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["provider"], "anthropic");
}

#[tokio::test]
async fn health_and_dashboard() {
    let app = app().await;

    let (status, json) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "content-digest");

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<title>Content Digest</title>"));
}
