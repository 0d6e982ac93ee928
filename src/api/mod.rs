//! JSON API and dashboard routes.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ai::Summarizer;
use crate::db::Repository;
use crate::services::Extractor;

pub mod auth;
pub mod error;
pub mod health;
pub mod items;
pub mod search;
pub mod settings;
pub mod summaries;
pub mod ui;
pub mod views;

pub use auth::Authorized;
pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repository: Repository,
    pub extractor: Arc<dyn Extractor>,
    pub summarizer: Arc<Summarizer>,
    /// Bearer token guarding mutations. `None` rejects them all.
    pub api_token: Option<String>,
    pub process_on_submit: bool,
}

impl AppState {
    pub fn new(
        repository: Repository,
        extractor: Arc<dyn Extractor>,
        summarizer: Arc<Summarizer>,
        api_token: Option<String>,
    ) -> Self {
        Self {
            repository,
            extractor,
            summarizer,
            api_token,
            process_on_submit: true,
        }
    }

    pub fn with_processing(mut self, enabled: bool) -> Self {
        self.process_on_submit = enabled;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ui::serve_index))
        .route("/health", get(health::health_check))
        .route("/api/summaries", post(summaries::submit_url))
        .route("/api/content-items", get(items::list_items))
        .route("/api/content-items/:id", get(items::get_item))
        .route("/api/content-items/:id/edit", post(items::edit_summary))
        .route("/api/content-items/:id/resummarize", post(items::resummarize))
        .route("/api/content-items/:id/edits", get(items::list_edits))
        .route("/api/search", get(search::search_items))
        .route(
            "/api/settings/prompt",
            get(settings::get_prompt).put(settings::update_prompt),
        )
        .route(
            "/api/settings/api-keys",
            get(settings::list_api_keys).post(settings::add_api_key),
        )
        .route("/api/settings/api-keys/:id", delete(settings::delete_api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
