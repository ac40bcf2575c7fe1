use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use matchflow_domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// The ingest service's error surface. Each variant maps to exactly one
/// HTTP status, per §7 of the spec: validation failures are always
/// 400, publish failures are always 503 (backpressure pushed to the
/// client, no local retention), query failures are 500, and a match
/// with no events is reported as 404.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("failed to publish event to the log: {0}")]
    PublishFailed(String),

    #[error("match not found")]
    NotFound,

    #[error("store query failed: {0}")]
    StoreFailed(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, error, field) = match &self {
            IngestError::Validation(e) => (StatusCode::BAD_REQUEST, "validation_error", Some(e.field())),
            IngestError::PublishFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "publish_failed", None),
            IngestError::NotFound => (StatusCode::NOT_FOUND, "not_found", None),
            IngestError::StoreFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None),
        };

        let body = ErrorBody {
            error,
            message: self.to_string(),
            field,
        };

        (status, Json(body)).into_response()
    }
}
