use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use tracing::{info, warn};

use crate::auth::UserSession;
use crate::rest::{not_found, spawn_error, store_error};
use crate::AppState;

/// POST /api/retry — re-enqueue every failed link for the caller. The
/// spawning happens before the response; the processing does not.
pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    session: UserSession,
) -> Response {
    let failed = match state.store.list_failed(session.user_id).await {
        Ok(rows) => rows,
        Err(e) => return store_error(e),
    };

    let mut ids = Vec::with_capacity(failed.len());
    for link in &failed {
        match state
            .pipeline
            .respawn_link(session.user_id, &link.url, link.id)
            .await
        {
            Ok(_) => ids.push(link.id),
            Err(e) => warn!(link_id = link.id, error = %e, "retry spawn failed"),
        }
    }

    info!(user_id = session.user_id, retried = ids.len(), "bulk retry");
    Json(serde_json::json!({
        "message": format!("retrying {} links", ids.len()),
        "ids": ids,
    }))
    .into_response()
}

/// POST /api/retry/{id} — re-enqueue one link regardless of status.
pub async fn retry_one(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Path(id): Path<i64>,
) -> Response {
    let link = match state.store.get_link(id).await {
        Ok(Some(link)) if link.user_id == session.user_id => link,
        Ok(_) => return not_found("link not found"),
        Err(e) => return store_error(e),
    };

    match state
        .pipeline
        .respawn_link(session.user_id, &link.url, link.id)
        .await
    {
        Ok(task_id) => Json(serde_json::json!({
            "taskId": task_id,
            "linkId": link.id,
            "status": "queued",
        }))
        .into_response(),
        Err(e) => spawn_error(e),
    }
}
