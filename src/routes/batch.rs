use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{
        is_valid_external_id, BatchResponse, ExternalIdRecord, ExternalIdsBatchRequest,
        ExternalKeyBatchRequest, MediaKey, RatingRecord, RuntimeRecord,
    },
    routes::AppState,
    services::resolve_in_order,
};

fn validate_external_ids(ids: &[String]) -> AppResult<()> {
    match ids.iter().find(|id| !is_valid_external_id(id)) {
        Some(invalid) => Err(AppError::InvalidInput(format!(
            "Invalid external id '{}'",
            invalid
        ))),
        None => Ok(()),
    }
}

/// Handler for batched TMDB id → external id lookups
pub async fn external_ids(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ExternalIdsBatchRequest>,
) -> AppResult<Json<BatchResponse<ExternalIdRecord>>> {
    state.batch.check_size(request.ids.len())?;

    let kind = request.kind.unwrap_or_default();
    let keys: Vec<MediaKey> = request
        .ids
        .into_iter()
        .map(|id| MediaKey::new(id, kind))
        .collect();

    tracing::info!(
        request_id = %request_id,
        kind = %kind,
        count = keys.len(),
        provider = state.provider.name(),
        "Resolving external id batch"
    );

    let provider = state.provider.as_ref();
    let data = resolve_in_order(
        keys,
        state.batch.concurrency,
        |key| provider.external_ids(key),
        |key| ExternalIdRecord::missing(*key),
    )
    .await;

    Ok(Json(BatchResponse::new(data)))
}

/// Handler for batched runtime lookups by external id
pub async fn runtimes(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ExternalKeyBatchRequest>,
) -> AppResult<Json<BatchResponse<RuntimeRecord>>> {
    state.batch.check_size(request.ids.len())?;
    validate_external_ids(&request.ids)?;

    tracing::info!(
        request_id = %request_id,
        count = request.ids.len(),
        "Resolving runtime batch"
    );

    let references = state.references.as_ref();
    let data = resolve_in_order(
        request.ids,
        state.batch.concurrency,
        |id: String| async move { references.runtime(&id).await },
        |id| RuntimeRecord::missing(id),
    )
    .await;

    Ok(Json(BatchResponse::new(data)))
}

/// Handler for batched rating lookups by external id
pub async fn ratings(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ExternalKeyBatchRequest>,
) -> AppResult<Json<BatchResponse<RatingRecord>>> {
    state.batch.check_size(request.ids.len())?;
    validate_external_ids(&request.ids)?;

    tracing::info!(
        request_id = %request_id,
        count = request.ids.len(),
        "Resolving rating batch"
    );

    let references = state.references.as_ref();
    let data = resolve_in_order(
        request.ids,
        state.batch.concurrency,
        |id: String| async move { references.rating(&id).await },
        |id| RatingRecord::missing(id),
    )
    .await;

    Ok(Json(BatchResponse::new(data)))
}
