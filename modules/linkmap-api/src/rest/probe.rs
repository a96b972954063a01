use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Json, Response},
};
use futures::Stream;
use tracing::error;

use linkmap_bridge::{receive_result, ReceiveError, ScrapeResultPayload};

use crate::auth::{ProbeIdentity, UserSession};
use crate::rest::{bad_request, not_found, store_error};
use crate::AppState;

/// GET /api/probe/subscribe_events — the long-lived server-push stream.
/// Pending events replay immediately; pings flow every 30 s.
pub async fn subscribe_events(
    State(state): State<Arc<AppState>>,
    probe: ProbeIdentity,
) -> Response {
    let subscription = match state.hub.subscribe(probe.device.user_id).await {
        Ok(sub) => sub,
        Err(e) => {
            error!(error = %e, "probe subscribe failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "subscribe failed"})),
            )
                .into_response();
        }
    };

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(async_stream::stream! {
            let mut subscription = subscription;
            while let Some(message) = subscription.rx.recv().await {
                yield Ok(Event::default()
                    .event(message.event_type)
                    .data(message.data.to_string()));
            }
            // Subscription dropped here: sink removed, heartbeat stopped.
        });

    Sse::new(stream).into_response()
}

/// POST /api/probe/receive_result — the HTTP callback a probe posts
/// scrape outcomes to.
pub async fn post_result(
    State(state): State<Arc<AppState>>,
    probe: ProbeIdentity,
    Json(payload): Json<ScrapeResultPayload>,
) -> Response {
    match receive_result(&state.store, &state.pipeline, &probe.device, payload).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(ReceiveError::UnknownEvent) => not_found("unknown event"),
        Err(ReceiveError::ForeignEvent) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "event belongs to another user"})),
        )
            .into_response(),
        Err(ReceiveError::BadPayload(msg)) => bad_request(msg),
        Err(ReceiveError::Store(e)) => store_error(e),
    }
}

/// GET /api/probe/status — session-side view of enrolled devices and
/// undelivered work.
pub async fn probe_status(
    State(state): State<Arc<AppState>>,
    session: UserSession,
) -> Response {
    let devices = match state.store.list_probe_devices(session.user_id).await {
        Ok(devices) => devices,
        Err(e) => return store_error(e),
    };
    let pending = match state
        .store
        .count_pending_probe_events(session.user_id)
        .await
    {
        Ok(n) => n,
        Err(e) => return store_error(e),
    };

    let devices: Vec<serde_json::Value> = devices
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "last_seen_at": d.last_seen_at,
                "created_at": d.created_at,
                "connected": state.hub.subscriber_count(session.user_id) > 0,
            })
        })
        .collect();

    Json(serde_json::json!({
        "devices": devices,
        "pending_events_count": pending,
    }))
    .into_response()
}
