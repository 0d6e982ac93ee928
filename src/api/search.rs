use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};

use super::error::ApiResult;
use super::views::{ListResponse, Paging};
use super::AppState;

/// GET /api/search?q=&limit=&offset=
///
/// Case-insensitive match on title and summary. A blank query lists
/// everything.
pub async fn search_items(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse>> {
    let paging = Paging::from_params(&params);
    let query = params
        .get("q")
        .map(|q| q.trim().to_string())
        .unwrap_or_default();

    let page = if query.is_empty() {
        state.repository.list_items(paging.limit, paging.offset).await?
    } else {
        state
            .repository
            .search_items(&query, paging.limit, paging.offset)
            .await?
    };

    Ok(Json(ListResponse::new(page, paging, Some(query))))
}
