use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{ContentItem, EditKind, NewSummaryEdit, SummaryEdit};

use super::error::{ApiError, ApiResult};
use super::views::{ItemView, ListResponse, Paging};
use super::AppState;

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub success: bool,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EditHistory {
    pub data: Vec<SummaryEdit>,
    pub count: usize,
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid content item id: {}", raw)))
}

async fn load_item(state: &AppState, id: i64) -> ApiResult<ContentItem> {
    state
        .repository
        .get_item(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("content item {} not found", id)))
}

/// Edit records are best-effort: the summary change already happened.
async fn record_edit(state: &AppState, edit: NewSummaryEdit) {
    let item_id = edit.content_item_id;
    if let Err(e) = state.repository.append_edit(edit).await {
        tracing::warn!("Failed to record edit for item {}: {}", item_id, e);
    }
}

/// GET /api/content-items?limit=&offset=
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse>> {
    let paging = Paging::from_params(&params);
    let page = state.repository.list_items(paging.limit, paging.offset).await?;
    Ok(Json(ListResponse::new(page, paging, None)))
}

/// GET /api/content-items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ItemView>> {
    let id = parse_id(&id)?;
    let item = load_item(&state, id).await?;
    Ok(Json(ItemView::detail_of(item)))
}

/// POST /api/content-items/:id/edit
///
/// Replaces the summary with `newContent` and records a manual edit.
pub async fn edit_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<EditResponse>> {
    let id = parse_id(&id)?;
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let new_content = body
        .get("newContent")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ApiError::BadRequest("newContent must be a non-empty string".to_string()))?
        .to_string();

    let previous = load_item(&state, id).await?.summary;

    let updated = state
        .repository
        .update_summary(id, new_content.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("content item {} not found", id)))?;
    tracing::info!("Summary of item {} edited", id);

    record_edit(
        &state,
        NewSummaryEdit {
            content_item_id: id,
            edit_type: EditKind::ManualEdit,
            previous_content: previous,
            new_content: new_content.clone(),
        },
    )
    .await;

    Ok(Json(EditResponse {
        success: true,
        summary: new_content,
        updated_at: updated.updated_at,
        provider_used: None,
    }))
}

/// POST /api/content-items/:id/resummarize
///
/// Summarizes the stored original content again with the current prompt.
/// Nothing is changed unless summarization succeeds.
pub async fn resummarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EditResponse>> {
    let id = parse_id(&id)?;
    let item = load_item(&state, id).await?;

    let source = item.source_text().ok_or_else(|| {
        ApiError::BadRequest("no original content stored for this item".to_string())
    })?;

    let result = state.summarizer.summarize(source, None).await?;

    let updated = state
        .repository
        .update_summary(id, result.summary.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("content item {} not found", id)))?;
    tracing::info!("Item {} re-summarized by {}", id, result.provider_used);

    record_edit(
        &state,
        NewSummaryEdit {
            content_item_id: id,
            edit_type: EditKind::Resummarize,
            previous_content: item.summary.clone(),
            new_content: result.summary.clone(),
        },
    )
    .await;

    Ok(Json(EditResponse {
        success: true,
        summary: result.summary,
        updated_at: updated.updated_at,
        provider_used: Some(result.provider_used),
    }))
}

/// GET /api/content-items/:id/edits
pub async fn list_edits(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EditHistory>> {
    let id = parse_id(&id)?;
    load_item(&state, id).await?;

    let data = state.repository.list_edits(id).await?;
    Ok(Json(EditHistory {
        count: data.len(),
        data,
    }))
}
