use chrono::{DateTime, Utc};
use linkmap_common::LinkStatus;
use sqlx::Row;

use crate::error::Result;
use crate::LinkStore;

/// Columns returned for a full link row. The generated `search_tsv`
/// column is intentionally excluded.
const LINK_COLUMNS: &str = "id, user_id, url, title, description, image, site_name, content_type, \
     markdown, summary, insight, tags, images, related_ids, summary_vector, \
     status, error, created_at, updated_at";

/// A row from the links table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
    pub content_type: Option<String>,
    pub markdown: Option<String>,
    pub summary: Option<String>,
    pub insight: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub images: Option<serde_json::Value>,
    pub related_ids: Option<serde_json::Value>,
    pub summary_vector: Option<pgvector::Vector>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    pub fn status(&self) -> Option<LinkStatus> {
        LinkStatus::parse(&self.status)
    }

    /// Parsed tag list; empty when no tags were stored.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Parsed cached relation-id list; empty when none stored.
    pub fn related_id_list(&self) -> Vec<i64> {
        self.related_ids
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Slim projection for list endpoints.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkSummaryRow {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update of scraped metadata and LLM outputs. `None` fields
/// are left untouched.
#[derive(Debug, Clone, Default)]
pub struct LinkFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
    pub content_type: Option<String>,
    pub markdown: Option<String>,
    pub summary: Option<String>,
    pub insight: Option<String>,
    pub tags: Option<Vec<String>>,
    pub images: Option<serde_json::Value>,
}

impl LinkStore {
    /// Idempotent by (user, url): an existing link is reset to `pending`
    /// with its error cleared; otherwise a fresh row is created.
    /// Returns `(link_id, was_existing)`.
    pub async fn upsert_link(&self, user_id: i64, url: &str) -> Result<(i64, bool)> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM links WHERE user_id = $1 AND url = $2",
        )
        .bind(user_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE links SET status = 'pending', error = NULL, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            return Ok((id, true));
        }

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO links (user_id, url) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        Ok((id, false))
    }

    pub async fn get_link(&self, link_id: i64) -> Result<Option<Link>> {
        let row = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = $1"
        ))
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_link_by_url(&self, user_id: i64, url: &str) -> Result<Option<Link>> {
        let row = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE user_id = $1 AND url = $2"
        ))
        .bind(user_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Atomically update named fields and bump `updated_at`.
    pub async fn update_link_fields(&self, link_id: i64, fields: LinkFields) -> Result<()> {
        let mut qb = sqlx::QueryBuilder::new("UPDATE links SET updated_at = now()");

        if let Some(v) = fields.title {
            qb.push(", title = ").push_bind(v);
        }
        if let Some(v) = fields.description {
            qb.push(", description = ").push_bind(v);
        }
        if let Some(v) = fields.image {
            qb.push(", image = ").push_bind(v);
        }
        if let Some(v) = fields.site_name {
            qb.push(", site_name = ").push_bind(v);
        }
        if let Some(v) = fields.content_type {
            qb.push(", content_type = ").push_bind(v);
        }
        if let Some(v) = fields.markdown {
            qb.push(", markdown = ").push_bind(v);
        }
        if let Some(v) = fields.summary {
            qb.push(", summary = ").push_bind(v);
        }
        if let Some(v) = fields.insight {
            qb.push(", insight = ").push_bind(v);
        }
        if let Some(v) = fields.tags {
            qb.push(", tags = ").push_bind(serde_json::json!(v));
        }
        if let Some(v) = fields.images {
            qb.push(", images = ").push_bind(v);
        }

        qb.push(" WHERE id = ").push_bind(link_id);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Atomic status transition. `error` replaces the stored message;
    /// `None` clears it.
    pub async fn set_link_status(
        &self,
        link_id: i64,
        status: LinkStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE links SET status = $2, error = $3, updated_at = now() WHERE id = $1")
            .bind(link_id)
            .bind(status.as_str())
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_summary_vector(&self, link_id: i64, vector: pgvector::Vector) -> Result<()> {
        sqlx::query("UPDATE links SET summary_vector = $2, updated_at = now() WHERE id = $1")
            .bind(link_id)
            .bind(vector)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_recent(&self, user_id: i64, limit: i64) -> Result<Vec<LinkSummaryRow>> {
        let rows = sqlx::query_as::<_, LinkSummaryRow>(
            r#"
            SELECT id, url, title, status, created_at FROM links
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_paginated(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LinkSummaryRow>> {
        let rows = sqlx::query_as::<_, LinkSummaryRow>(
            r#"
            SELECT id, url, title, status, created_at FROM links
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_analyzed(&self, user_id: i64) -> Result<Vec<LinkSummaryRow>> {
        let rows = sqlx::query_as::<_, LinkSummaryRow>(
            r#"
            SELECT id, url, title, status, created_at FROM links
            WHERE user_id = $1 AND status = 'analyzed'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Links in `error` status, oldest first — the maintenance retry scan.
    pub async fn list_failed(&self, user_id: i64) -> Result<Vec<Link>> {
        let rows = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links \
             WHERE user_id = $1 AND status = 'error' ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete the row. Relation rows and probe events go with it via FK
    /// cascade; remote relation caches are scrubbed separately (see
    /// `remove_link_from_relations`).
    pub async fn delete_link(&self, link_id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Number of link rows a user holds for a URL. Test/audit helper for
    /// the one-row-per-(user, url) property.
    pub async fn count_links_by_url(&self, user_id: i64, url: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM links WHERE user_id = $1 AND url = $2")
            .bind(user_id)
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
