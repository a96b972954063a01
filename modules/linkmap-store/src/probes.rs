use chrono::{DateTime, Utc};
use linkmap_common::{ProbeEventStatus, UrlKind};
use uuid::Uuid;

use crate::error::Result;
use crate::LinkStore;

const EVENT_COLUMNS: &str =
    "id, user_id, link_id, url, url_kind, status, result, error, created_at, sent_at, completed_at";

/// A unit of scrape work dispatched to a probe.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProbeEvent {
    pub id: Uuid,
    pub user_id: i64,
    pub link_id: i64,
    pub url: String,
    pub url_kind: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProbeEvent {
    pub fn status(&self) -> Option<ProbeEventStatus> {
        ProbeEventStatus::parse(&self.status)
    }
}

/// An enrolled probe daemon. The bearer token is the sole capability
/// for subscribe/result calls.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProbeDevice {
    pub id: Uuid,
    pub user_id: i64,
    pub token: String,
    pub name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LinkStore {
    pub async fn create_probe_event(
        &self,
        user_id: i64,
        link_id: i64,
        url: &str,
        url_kind: UrlKind,
    ) -> Result<ProbeEvent> {
        let row = sqlx::query_as::<_, ProbeEvent>(&format!(
            "INSERT INTO probe_events (user_id, link_id, url, url_kind) \
             VALUES ($1, $2, $3, $4) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(link_id)
        .bind(url)
        .bind(url_kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_probe_event(&self, event_id: Uuid) -> Result<Option<ProbeEvent>> {
        let row = sqlx::query_as::<_, ProbeEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM probe_events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Mark an event `sent`. Only a `pending` event transitions.
    pub async fn mark_probe_event_sent(&self, event_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE probe_events SET status = 'sent', sent_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal transition to `completed` or `error`. The first terminal
    /// transition wins: duplicate deliveries of a result are absorbed.
    /// Returns whether this call performed the transition.
    pub async fn complete_probe_event(
        &self,
        event_id: Uuid,
        status: ProbeEventStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool> {
        debug_assert!(status.is_terminal());
        let res = sqlx::query(
            r#"
            UPDATE probe_events
            SET status = $2, result = $3, error = $4, completed_at = now()
            WHERE id = $1 AND status IN ('pending', 'sent')
            "#,
        )
        .bind(event_id)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Undelivered events for a user, in creation order — the replay set
    /// for a freshly connected probe.
    pub async fn list_pending_probe_events(&self, user_id: i64) -> Result<Vec<ProbeEvent>> {
        let rows = sqlx::query_as::<_, ProbeEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM probe_events \
             WHERE user_id = $1 AND status = 'pending' ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_pending_probe_events(&self, user_id: i64) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM probe_events WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    /// Events created before `cutoff` that never reached a terminal
    /// state. Fed to the expiry reaper.
    pub async fn list_expired_probe_events(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProbeEvent>> {
        let rows = sqlx::query_as::<_, ProbeEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM probe_events \
             WHERE status IN ('pending', 'sent') AND created_at < $1 ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // --- devices ---

    pub async fn create_probe_device(
        &self,
        user_id: i64,
        token: &str,
        name: &str,
    ) -> Result<ProbeDevice> {
        let row = sqlx::query_as::<_, ProbeDevice>(
            r#"
            INSERT INTO probe_devices (user_id, token, name)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, name, last_seen_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_probe_device_by_token(&self, token: &str) -> Result<Option<ProbeDevice>> {
        let row = sqlx::query_as::<_, ProbeDevice>(
            "SELECT id, user_id, token, name, last_seen_at, created_at \
             FROM probe_devices WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_probe_devices(&self, user_id: i64) -> Result<Vec<ProbeDevice>> {
        let rows = sqlx::query_as::<_, ProbeDevice>(
            "SELECT id, user_id, token, name, last_seen_at, created_at \
             FROM probe_devices WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn touch_probe_device(&self, device_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE probe_devices SET last_seen_at = now() WHERE id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
