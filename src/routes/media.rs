use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Genre, MediaItem, MediaKind, Page, TimeWindow},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    page: Option<u32>,
    window: Option<TimeWindow>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
    page: Option<u32>,
}

/// Handler for a page of trending titles
pub async fn trending(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MediaKind>,
    Query(params): Query<TrendingQuery>,
) -> AppResult<Json<Page<MediaItem>>> {
    let page = state
        .provider
        .trending(
            kind,
            params.window.unwrap_or_default(),
            params.page.unwrap_or(1),
        )
        .await?;
    Ok(Json(page))
}

/// Handler for title search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MediaKind>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Page<MediaItem>>> {
    let page = state
        .provider
        .search(kind, &params.q, params.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

/// Handler for the genre reference list
pub async fn genres(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<MediaKind>,
) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.provider.genres(kind).await?))
}
