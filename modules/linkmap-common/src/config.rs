use anyhow::{Context, Result};

/// Coordinator configuration, loaded from environment variables once at
/// startup. Secrets only; tunables carry defaults.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
    /// Public base URL, used to build the device-verification URI.
    pub web_base_url: String,
    /// Signing secret for the session cookie.
    pub session_secret: String,

    // AI / LLM
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,

    // Cloud scraping (Browserless /content endpoint)
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Pipeline
    pub pipeline_workers: usize,
    pub claim_timeout_secs: u64,
    pub probe_event_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            web_host: std::env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: std::env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("WEB_PORT must be a number")?,
            web_base_url: std::env::var("WEB_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_secret: std::env::var("SESSION_SECRET")
                .context("SESSION_SECRET is required")?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            chat_model: std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            browserless_url: std::env::var("BROWSERLESS_URL").ok(),
            browserless_token: std::env::var("BROWSERLESS_TOKEN").ok(),
            pipeline_workers: std::env::var("PIPELINE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            claim_timeout_secs: std::env::var("CLAIM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            probe_event_ttl_secs: std::env::var("PROBE_EVENT_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
        };

        config.log_redacted();
        Ok(config)
    }

    /// Log which secrets are present without revealing them.
    fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "(empty)".to_string();
            }
            format!("({} chars)", val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL = {}", preview(&self.database_url));
        tracing::info!("  SESSION_SECRET = {}", preview(&self.session_secret));
        tracing::info!("  OPENAI_API_KEY = {}", preview(&self.openai_api_key));
        tracing::info!(
            "  BROWSERLESS_URL = {}",
            self.browserless_url.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  WEB_BASE_URL = {}", self.web_base_url);
        tracing::info!("  PIPELINE_WORKERS = {}", self.pipeline_workers);
    }
}
