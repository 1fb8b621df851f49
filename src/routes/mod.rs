use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;
use crate::store::StoreError;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Build the API router (metrics is mounted separately, it carries its own
/// state).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{job_id}/download", get(jobs::download_manifest))
        .with_state(state)
}

/// API-level error, rendered as `{"detail": ...}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid file type. Only JPEG, PNG, WEBP allowed.")]
    UnsupportedMediaType,

    #[error("Missing or invalid identity")]
    Unauthorized,

    #[error("Job not found")]
    NotFound,

    #[error("Job not completed yet")]
    NotCompleted,

    #[error("Invalid multipart payload")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Storage backend error")]
    Storage(#[from] StorageError),

    #[error("Job store error")]
    Store(#[from] StoreError),

    #[error("Dispatch queue error")]
    Queue(#[from] QueueError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Multipart(_) | ApiError::NotCompleted => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Store(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                ApiError::Storage(e) => tracing::error!(error = %e, "storage backend error"),
                ApiError::Store(e) => tracing::error!(error = %e, "job store error"),
                ApiError::Queue(e) => tracing::error!(error = %e, "dispatch queue error"),
                _ => {}
            }
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
