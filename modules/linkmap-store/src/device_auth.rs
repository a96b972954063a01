use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::LinkStore;

/// An in-flight device-code enrollment request.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceAuthRequest {
    pub device_code: String,
    pub user_code: String,
    pub user_id: Option<i64>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DeviceAuthRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

const AUTH_COLUMNS: &str = "device_code, user_code, user_id, status, expires_at, created_at";

impl LinkStore {
    pub async fn create_device_auth(
        &self,
        device_code: &str,
        user_code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<DeviceAuthRequest> {
        let row = sqlx::query_as::<_, DeviceAuthRequest>(&format!(
            "INSERT INTO device_auth_requests (device_code, user_code, expires_at) \
             VALUES ($1, $2, $3) RETURNING {AUTH_COLUMNS}"
        ))
        .bind(device_code)
        .bind(user_code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_device_auth(&self, device_code: &str) -> Result<Option<DeviceAuthRequest>> {
        let row = sqlx::query_as::<_, DeviceAuthRequest>(&format!(
            "SELECT {AUTH_COLUMNS} FROM device_auth_requests WHERE device_code = $1"
        ))
        .bind(device_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_device_auth_by_user_code(
        &self,
        user_code: &str,
    ) -> Result<Option<DeviceAuthRequest>> {
        let row = sqlx::query_as::<_, DeviceAuthRequest>(&format!(
            "SELECT {AUTH_COLUMNS} FROM device_auth_requests WHERE user_code = $1"
        ))
        .bind(user_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Attach the authorizing user. Only a pending, unexpired request
    /// transitions; returns whether it did.
    pub async fn authorize_device_auth(&self, device_code: &str, user_id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE device_auth_requests
            SET status = 'authorized', user_id = $2
            WHERE device_code = $1 AND status = 'pending' AND expires_at > now()
            "#,
        )
        .bind(device_code)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn expire_device_auth(&self, device_code: &str) -> Result<()> {
        sqlx::query(
            "UPDATE device_auth_requests SET status = 'expired' WHERE device_code = $1",
        )
        .bind(device_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a consumed request so a replayed poll cannot mint another
    /// device.
    pub async fn delete_device_auth(&self, device_code: &str) -> Result<()> {
        sqlx::query("DELETE FROM device_auth_requests WHERE device_code = $1")
            .bind(device_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
