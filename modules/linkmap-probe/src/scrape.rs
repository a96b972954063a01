//! Local scrape execution. Jobs run concurrently with the event loop;
//! the loop never waits on one.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use browserless_client::BrowserlessClient;
use linkmap_common::{extract, ScrapeData};

use crate::state::ProbeConfig;

/// External twitter fetcher gets this long.
const TWITTER_TIMEOUT: Duration = Duration::from_secs(60);
/// Attempts for posting the result back.
const POST_ATTEMPTS: u32 = 3;
const POST_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub event_id: Uuid,
    pub url: String,
    pub url_type: String,
    pub link_id: i64,
}

/// Execute a scrape request end to end: fetch locally, then POST the
/// result (success or failure) back to the coordinator.
pub async fn run_job(http: reqwest::Client, config: ProbeConfig, request: ScrapeRequest) {
    info!(event_id = %request.event_id, url = %request.url, kind = %request.url_type, "scrape job started");

    let payload = match execute(&request).await {
        Ok(data) => {
            info!(event_id = %request.event_id, markdown_len = data.markdown.len(), "scrape succeeded");
            serde_json::json!({
                "event_id": request.event_id,
                "success": true,
                "data": data,
            })
        }
        Err(e) => {
            warn!(event_id = %request.event_id, error = %format!("{e:#}"), "scrape failed");
            serde_json::json!({
                "event_id": request.event_id,
                "success": false,
                "error": format!("{e:#}"),
            })
        }
    };

    if let Err(e) = post_result(&http, &config, &payload).await {
        error!(event_id = %request.event_id, error = %e, "failed to deliver scrape result");
    }
}

async fn execute(request: &ScrapeRequest) -> Result<ScrapeData> {
    match request.url_type.as_str() {
        "twitter" => twitter_fetch(&request.url).await,
        _ => web_fetch(&request.url).await,
    }
}

/// Twitter scrapes shell out to an external CLI that runs with the
/// user's browser cookies. It prints a scrape payload as JSON.
async fn twitter_fetch(url: &str) -> Result<ScrapeData> {
    let bin = std::env::var("TWITTER_FETCHER_BIN")
        .context("TWITTER_FETCHER_BIN is not set")?;

    let output = tokio::time::timeout(
        TWITTER_TIMEOUT,
        tokio::process::Command::new(&bin)
            .arg(url)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .context("twitter fetcher timed out")?
    .with_context(|| format!("running {bin}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("twitter fetcher exited {}: {}", output.status, stderr.trim());
    }

    serde_json::from_slice(&output.stdout).context("parsing twitter fetcher output")
}

/// Web scrapes render through a local Browserless, torn down with the
/// per-job client.
async fn web_fetch(url: &str) -> Result<ScrapeData> {
    let base = std::env::var("BROWSERLESS_URL").context("BROWSERLESS_URL is not set")?;
    let token = std::env::var("BROWSERLESS_TOKEN").ok();

    let client = BrowserlessClient::new(&base, token.as_deref());
    let html = client.content(url).await?;
    Ok(extract::scrape_data_from_html(&html, url))
}

async fn post_result(
    http: &reqwest::Client,
    config: &ProbeConfig,
    payload: &serde_json::Value,
) -> Result<()> {
    let token = config
        .access_token
        .as_deref()
        .context("no access token in config")?;
    let endpoint = format!(
        "{}/api/probe/receive_result",
        config.api_base.trim_end_matches('/')
    );

    let mut last_error = None;
    for attempt in 0..POST_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(POST_RETRY_DELAY).await;
        }
        match http
            .post(&endpoint)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                last_error = Some(anyhow::anyhow!("result endpoint returned {}", resp.status()));
            }
            Err(e) => last_error = Some(e.into()),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("result delivery failed")))
}
