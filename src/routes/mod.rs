use axum::{
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    db::{ReferenceRepository, WatchLaterRepository},
    error::{AppError, AppResult},
    middleware::{make_span_with_request_id, request_id_middleware},
    services::MetadataProvider,
};

pub mod batch;
pub mod media;
pub mod watch_later;

/// Limits applied to the batch endpoints
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub concurrency: usize,
    pub max_size: usize,
}

impl BatchSettings {
    pub fn check_size(&self, len: usize) -> AppResult<()> {
        if len > self.max_size {
            return Err(AppError::InvalidInput(format!(
                "Batch of {} ids exceeds the limit of {}",
                len, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_size: 100,
        }
    }
}

impl From<&Config> for BatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.batch_concurrency,
            max_size: config.max_batch_size,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn MetadataProvider>,
    pub references: Arc<dyn ReferenceRepository>,
    pub watch_later: Arc<dyn WatchLaterRepository>,
    pub batch: BatchSettings,
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trending/:kind", get(media::trending))
        .route("/search/:kind", get(media::search))
        .route("/genres/:kind", get(media::genres))
        .route("/batch/external-ids", post(batch::external_ids))
        .route("/batch/runtime", post(batch::runtimes))
        .route("/batch/rating", post(batch::ratings))
        .route(
            "/watch-later",
            get(watch_later::list)
                .post(watch_later::add)
                .delete(watch_later::remove),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
