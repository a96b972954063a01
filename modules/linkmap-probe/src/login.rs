//! Device-code enrollment from the probe's side.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::state::{ProbeConfig, StateDir};

#[derive(Deserialize)]
struct DeviceAuthResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user_id: Option<i64>,
    error: Option<String>,
}

/// Run the device-code flow against `api_base`, then persist the token.
pub async fn login(state_dir: &StateDir, api_base: &str) -> Result<()> {
    let api_base = api_base.trim_end_matches('/').to_string();
    let http = reqwest::Client::new();

    let start: DeviceAuthResponse = http
        .post(format!("{api_base}/api/auth/device"))
        .send()
        .await
        .context("reaching the coordinator")?
        .error_for_status()?
        .json()
        .await
        .context("decoding device auth response")?;

    println!("To connect this probe, visit:");
    println!();
    println!("    {}", start.verification_uri);
    println!();
    println!("and enter the code: {}", start.user_code);
    println!();
    println!(
        "Waiting for authorization (expires in {} minutes)...",
        start.expires_in / 60
    );

    let interval = Duration::from_secs(start.interval.max(1));
    loop {
        tokio::time::sleep(interval).await;

        let token: TokenResponse = http
            .post(format!("{api_base}/api/auth/token"))
            .json(&serde_json::json!({"device_code": start.device_code}))
            .send()
            .await?
            .json()
            .await
            .context("decoding token response")?;

        match (token.access_token, token.error.as_deref()) {
            (Some(access_token), _) => {
                state_dir.save_config(&ProbeConfig {
                    api_base,
                    access_token: Some(access_token),
                    user_id: token.user_id,
                })?;
                println!("Probe connected. Start it with: lmp run");
                return Ok(());
            }
            (None, Some("authorization_pending")) => continue,
            (None, Some("expired_token")) => {
                anyhow::bail!("the code expired before it was authorized; run login again")
            }
            (None, other) => {
                anyhow::bail!("enrollment failed: {}", other.unwrap_or("unknown error"))
            }
        }
    }
}
