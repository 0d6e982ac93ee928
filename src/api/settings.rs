use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::{ProviderStatus, DEFAULT_SYSTEM_PROMPT};
use crate::models::{NewApiKey, ProviderKind};

use super::auth::Authorized;
use super::error::{ApiError, ApiResult};
use super::AppState;

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt_text: String,
    pub is_default: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt_text: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyList {
    pub data: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    pub id: i64,
    pub provider: ProviderKind,
    pub priority_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub success: bool,
}

/// GET /api/settings/prompt
pub async fn get_prompt(State(state): State<AppState>) -> ApiResult<Json<PromptResponse>> {
    let response = match state.repository.current_system_prompt().await? {
        Some(prompt) => PromptResponse {
            prompt_text: prompt.prompt_text,
            is_default: false,
            created_at: Some(prompt.created_at),
        },
        None => PromptResponse {
            prompt_text: DEFAULT_SYSTEM_PROMPT.to_string(),
            is_default: true,
            created_at: None,
        },
    };
    Ok(Json(response))
}

/// PUT /api/settings/prompt
pub async fn update_prompt(
    State(state): State<AppState>,
    _auth: Authorized,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> ApiResult<Json<PromptResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let text = request.prompt_text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("prompt_text must not be empty".to_string()));
    }

    let prompt = state.repository.set_system_prompt(text.to_string()).await?;
    tracing::info!("System prompt {} is now current", prompt.id);

    Ok(Json(PromptResponse {
        prompt_text: prompt.prompt_text,
        is_default: false,
        created_at: Some(prompt.created_at),
    }))
}

/// GET /api/settings/api-keys
///
/// Lists configured credentials without their secrets.
pub async fn list_api_keys(State(state): State<AppState>) -> ApiResult<Json<ApiKeyList>> {
    let data = state.summarizer.provider_status().await?;
    Ok(Json(ApiKeyList { data }))
}

/// POST /api/settings/api-keys
pub async fn add_api_key(
    State(state): State<AppState>,
    _auth: Authorized,
    payload: Result<Json<NewApiKey>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedApiKey>)> {
    let Json(key) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if key.key.trim().is_empty() {
        return Err(ApiError::BadRequest("key must not be empty".to_string()));
    }

    let created = CreatedApiKey {
        id: 0,
        provider: key.provider,
        priority_order: key.priority_order,
        is_active: key.is_active,
    };
    let id = state.repository.insert_api_key(key).await?;
    tracing::info!("Added {} key {} at priority {}", created.provider, id, created.priority_order);

    Ok((StatusCode::CREATED, Json(CreatedApiKey { id, ..created })))
}

/// DELETE /api/settings/api-keys/:id
pub async fn delete_api_key(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid API key id: {}", id)))?;

    if !state.repository.delete_api_key(id).await? {
        return Err(ApiError::NotFound(format!("API key {} not found", id)));
    }
    tracing::info!("Deleted API key {}", id);
    Ok(Json(Deleted { success: true }))
}
