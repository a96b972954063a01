use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::LinkStore;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub chat_id: String,
    pub display_name: String,
    pub status: String,
    pub invite_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LinkStore {
    /// Create-or-refresh a user keyed by their external chat id. New
    /// users start `pending` until an invite is consumed.
    pub async fn upsert_user(&self, chat_id: &str, display_name: &str) -> Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (chat_id, display_name)
            VALUES ($1, $2)
            ON CONFLICT (chat_id) DO UPDATE SET display_name = EXCLUDED.display_name
            RETURNING id, chat_id, display_name, status, invite_code, created_at
            "#,
        )
        .bind(chat_id)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT id, chat_id, display_name, status, invite_code, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Activate a pending user, recording the consumed invite.
    pub async fn activate_user(&self, user_id: i64, invite_code: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET status = 'active', invite_code = $2 WHERE id = $1",
        )
        .bind(user_id)
        .bind(invite_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
