use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use linkmap_bridge::device_flow::{self, PollOutcome};

use crate::rest::store_error;
use crate::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    device_code: String,
}

/// POST /api/auth/device — unauthenticated enrollment start.
pub async fn start_device_auth(State(state): State<Arc<AppState>>) -> Response {
    match device_flow::initiate(&state.store, &state.config.web_base_url).await {
        Ok(start) => Json(start).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/auth/token — the probe's poll endpoint.
pub async fn poll_device_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    match device_flow::poll(&state.store, &body.device_code).await {
        Ok(PollOutcome::Issued {
            access_token,
            user_id,
        }) => Json(serde_json::json!({
            "access_token": access_token,
            "user_id": user_id,
        }))
        .into_response(),
        Ok(PollOutcome::AuthorizationPending) => {
            Json(serde_json::json!({"error": "authorization_pending"})).into_response()
        }
        Ok(PollOutcome::ExpiredToken) => {
            Json(serde_json::json!({"error": "expired_token"})).into_response()
        }
        Ok(PollOutcome::InvalidDeviceCode) => {
            Json(serde_json::json!({"error": "invalid_device_code"})).into_response()
        }
        Err(e) => store_error(e),
    }
}
