use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use linkmap_common::ScrapeData;
use linkmap_store::ProbeEvent;

pub const EVENT_SCRAPE_REQUEST: &str = "scrape_request";
pub const EVENT_PING: &str = "ping";

/// One message on a probe's subscription stream. The API layer frames
/// it as `event: <type>\ndata: <json>\n\n`.
#[derive(Debug, Clone)]
pub struct ProbeMessage {
    pub event_type: &'static str,
    pub data: serde_json::Value,
}

impl ProbeMessage {
    pub fn ping() -> Self {
        Self {
            event_type: EVENT_PING,
            data: serde_json::json!({}),
        }
    }

    pub fn scrape_request(event: &ProbeEvent) -> Self {
        Self {
            event_type: EVENT_SCRAPE_REQUEST,
            data: serde_json::to_value(ScrapeRequestEvent::from(event))
                .expect("scrape request serializes"),
        }
    }
}

/// Payload of a `scrape_request` stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequestEvent {
    pub event_id: Uuid,
    pub url: String,
    pub url_type: String,
    pub link_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&ProbeEvent> for ScrapeRequestEvent {
    fn from(event: &ProbeEvent) -> Self {
        Self {
            event_id: event.id,
            url: event.url.clone(),
            url_type: event.url_kind.clone(),
            link_id: event.link_id,
            created_at: event.created_at,
        }
    }
}

/// What a probe posts back to the result callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResultPayload {
    pub event_id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScrapeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
