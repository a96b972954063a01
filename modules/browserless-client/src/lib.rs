pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use tracing::debug;

/// Navigation timeout passed to the browser, plus the settle delay we
/// allow after load before the DOM is captured.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLE_DELAY_MS: u64 = 2_000;

/// Client for a Browserless-compatible `/content` endpoint: renders a
/// page in headless Chrome (full JavaScript execution) and returns the
/// resulting HTML.
#[derive(Clone)]
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            // Navigation timeout plus headroom for settle + transfer.
            .timeout(NAVIGATION_TIMEOUT + Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML for a URL.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        debug!(url, "browserless content fetch");

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": {
                "timeout": NAVIGATION_TIMEOUT.as_millis() as u64,
                "waitUntil": "networkidle2",
            },
            "waitForTimeout": SETTLE_DELAY_MS,
        });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
