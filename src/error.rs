use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Rejected grid geometry
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum LayoutError {
    #[error("A grid row must hold at least one item")]
    NoColumns,

    #[error("Row height must be at least one unit, got {0}")]
    RowHeight(f64),

    #[error("Viewport height must be a finite, non-negative value, got {0}")]
    ViewportHeight(f64),
}

/// Errors raised by the client-side data core (batch clients, query cache,
/// watch-later sync, grid paging).
///
/// Cloneable so a single failed fetch can be handed to every subscriber that
/// shared the in-flight request.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Rejected before any network call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server answered with a non-2xx status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, timeout or other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be interpreted
    #[error("Decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// HTTP-like status carried by the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the same request could succeed.
    ///
    /// Client errors (4xx) are permanent except 408 (timeout) and 429 (rate limited).
    /// Validation and decode failures are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Validation(_) | FetchError::Decode(_) => false,
            FetchError::Status { status, .. } => match *status {
                408 | 429 => true,
                400..=499 => false,
                _ => true,
            },
            FetchError::Network(_) => true,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            FetchError::Status {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            FetchError::Decode(error.to_string())
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Decode(error.to_string())
    }
}
