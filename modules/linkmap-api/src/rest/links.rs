use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::auth::UserSession;
use crate::rest::{bad_request, not_found, spawn_error, store_error};
use crate::AppState;

const MAX_URL_LEN: usize = 2048;
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Deserialize)]
pub struct SubmitRequest {
    url: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    limit: Option<i64>,
}

/// Validate a submitted URL. Rejects non-http(s) schemes and targets
/// the cloud scraper must not be pointed at.
fn validate_url(raw: &str) -> Result<String, &'static str> {
    let url = raw.trim().to_string();
    if url.is_empty() {
        return Err("url is required");
    }
    if url.len() > MAX_URL_LEN {
        return Err("URL too long (max 2048 characters)");
    }
    let parsed = url::Url::parse(&url).map_err(|_| "Invalid URL")?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err("URL must use http or https scheme");
    }
    if let Some(host) = parsed.host_str() {
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            if ip.is_loopback() || is_private_ip(ip) {
                return Err("URLs pointing to private addresses are not allowed");
            }
        }
        let lower = host.to_lowercase();
        if lower == "localhost" || lower.ends_with(".local") || lower.ends_with(".internal") {
            return Err("URLs pointing to internal hosts are not allowed");
        }
    }
    Ok(url)
}

fn is_private_ip(ip: std::net::IpAddr) -> bool {
    match ip {
        std::net::IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.octets()[0] == 10
                || (v4.octets()[0] == 172 && (16..=31).contains(&v4.octets()[1]))
                || (v4.octets()[0] == 192 && v4.octets()[1] == 168)
        }
        std::net::IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// POST /api/links — spawn-and-return; the pipeline does the rest.
pub async fn submit_link(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Json(body): Json<SubmitRequest>,
) -> Response {
    let url = match validate_url(&body.url) {
        Ok(url) => url,
        Err(msg) => return bad_request(msg),
    };

    match state.pipeline.spawn_process_link(session.user_id, &url).await {
        Ok(task_id) => {
            info!(user_id = session.user_id, url = %url, task_id = %task_id, "link submitted");
            Json(serde_json::json!({
                "taskId": task_id,
                "url": url,
                "status": "queued",
            }))
            .into_response()
        }
        Err(e) => spawn_error(e),
    }
}

/// GET /api/links?limit=N
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    match state.store.list_recent(session.user_id, limit).await {
        Ok(rows) => {
            let out: Vec<serde_json::Value> = rows
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "id": l.id,
                        "url": l.url,
                        "title": l.title,
                        "status": l.status,
                        "created_at": l.created_at,
                    })
                })
                .collect();
            Json(out).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// GET /api/search?q=…&limit=N — ranked text search over the caller's
/// links, same item shape as the list endpoint.
pub async fn search_links(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Query(query): Query<SearchQuery>,
) -> Response {
    if query.q.trim().is_empty() {
        return bad_request("q is required");
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let ids = match state.store.text_search(&query.q, session.user_id, limit).await {
        Ok(ids) => ids,
        Err(e) => return store_error(e),
    };

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match state.store.get_link(id).await {
            Ok(Some(l)) => out.push(serde_json::json!({
                "id": l.id,
                "url": l.url,
                "title": l.title,
                "status": l.status,
                "created_at": l.created_at,
            })),
            Ok(None) => {}
            Err(e) => return store_error(e),
        }
    }
    Json(out).into_response()
}

/// GET /api/links/{id} — detail with parsed tag and relation lists.
pub async fn link_detail(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Path(id): Path<i64>,
) -> Response {
    let link = match state.store.get_link(id).await {
        Ok(Some(link)) if link.user_id == session.user_id => link,
        Ok(_) => return not_found("link not found"),
        Err(e) => return store_error(e),
    };

    let relations = match state.store.get_relations(id).await {
        Ok(r) => r,
        Err(e) => return store_error(e),
    };

    let mut related = Vec::with_capacity(relations.len());
    for (other_id, score) in relations {
        match state.store.get_link(other_id).await {
            Ok(Some(other)) => related.push(serde_json::json!({
                "id": other.id,
                "url": other.url,
                "title": other.title,
                "score": score,
            })),
            Ok(None) => {}
            Err(e) => return store_error(e),
        }
    }

    Json(serde_json::json!({
        "id": link.id,
        "url": link.url,
        "title": link.title,
        "description": link.description,
        "image": link.image,
        "site_name": link.site_name,
        "content_type": link.content_type,
        "summary": link.summary,
        "insight": link.insight,
        "tags": link.tag_list(),
        "status": link.status,
        "error": link.error,
        "related": related,
        "created_at": link.created_at,
        "updated_at": link.updated_at,
    }))
    .into_response()
}

/// DELETE /api/links/{id} — manual cascade orchestration: scrub remote
/// relation caches first, then delete (FK cascade removes relation rows
/// and probe events).
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Path(id): Path<i64>,
) -> Response {
    let link = match state.store.get_link(id).await {
        Ok(Some(link)) if link.user_id == session.user_id => link,
        Ok(_) => return not_found("link not found"),
        Err(e) => return store_error(e),
    };

    let scrubbed = match state.store.remove_link_from_relations(id).await {
        Ok(n) => n,
        Err(e) => return store_error(e),
    };

    if let Err(e) = state.store.delete_link(id).await {
        return store_error(e);
    }

    info!(link_id = id, scrubbed, "link deleted");
    Json(serde_json::json!({
        "message": "link deleted",
        "linkId": id,
        "url": link.url,
        "relatedLinksUpdated": scrubbed,
    }))
    .into_response()
}
