use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::pipeline::spawn_processing;
use crate::services::classify_url;

use super::auth::Authorized;
use super::error::{ApiError, ApiResult};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: i64,
    pub status: &'static str,
    pub message: String,
}

/// POST /api/summaries
///
/// Accepts a URL for processing. The item is stored as pending and handed to
/// a background task.
pub async fn submit_url(
    State(state): State<AppState>,
    _auth: Authorized,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let (_, content_type) =
        classify_url(&request.url).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let id = state
        .repository
        .insert_pending_item(request.url.trim().to_string(), content_type)
        .await?;
    tracing::info!("Accepted {} item {}", content_type, id);

    if state.process_on_submit {
        spawn_processing(
            state.repository.clone(),
            state.extractor.clone(),
            state.summarizer.clone(),
            id,
        );
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id,
            status: "pending",
            message: "URL accepted for processing".to_string(),
        }),
    ))
}
