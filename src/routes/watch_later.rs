use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::AuthUser,
    models::{WatchLaterEntry, WatchLaterRequest},
    routes::AppState,
};

/// Handler returning the user's watch-later list
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<WatchLaterEntry>>> {
    let entries = state.watch_later.list(user.id()).await?;
    Ok(Json(entries))
}

/// Handler adding a title to the watch-later list (idempotent)
pub async fn add(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<WatchLaterRequest>,
) -> AppResult<(StatusCode, Json<WatchLaterEntry>)> {
    let entry = state.watch_later.add(user.id(), request.key()).await?;

    tracing::info!(user_id = %user.id(), media = %request.key(), "Added to watch later");

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Handler removing a title from the watch-later list. Removing a title that
/// is not on the list succeeds.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<WatchLaterRequest>,
) -> AppResult<StatusCode> {
    let removed = state.watch_later.remove(user.id(), request.key()).await?;

    tracing::info!(
        user_id = %user.id(),
        media = %request.key(),
        removed,
        "Removed from watch later"
    );

    Ok(StatusCode::NO_CONTENT)
}
