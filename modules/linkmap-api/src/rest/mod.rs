pub mod device;
pub mod links;
pub mod probe;
pub mod retry;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Uniform 500 for store failures in API paths.
pub(crate) fn store_error(e: linkmap_store::StoreError) -> Response {
    tracing::error!(error = %e, "store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "store error"})),
    )
        .into_response()
}

pub(crate) fn spawn_error(e: sqlx::Error) -> Response {
    tracing::error!(error = %e, "task spawn failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "failed to enqueue task"})),
    )
        .into_response()
}

pub(crate) fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

pub(crate) fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}
