use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use browserless_client::BrowserlessClient;
use linkmap_bridge::ProbeHub;
use linkmap_common::Config;
use linkmap_pipeline::{
    fetcher::CloudArticleFetcher, ArticleFetcher, DisabledMediaProcessor, Pipeline, PipelineDeps,
    PIPELINE_QUEUE,
};
use linkmap_runtime::{TaskQueue, TaskRegistry, WorkerPool};
use linkmap_store::LinkStore;

mod auth;
mod pages;
mod reaper;
mod rest;

pub struct AppState {
    pub store: LinkStore,
    pub hub: Arc<ProbeHub>,
    pub pipeline: Pipeline,
    pub config: Config,
}

/// Stand-in fetcher when no Browserless endpoint is configured. Every
/// cloud scrape fails with a clear message; probe scrapes still work.
struct UnconfiguredFetcher;

#[async_trait::async_trait]
impl ArticleFetcher for UnconfiguredFetcher {
    async fn fetch(&self, _url: &str) -> Result<linkmap_common::ScrapeData> {
        anyhow::bail!("BROWSERLESS_URL is not configured")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("linkmap=info".parse()?))
        .init();

    let config = Config::from_env()?;

    let store = LinkStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let llm = Arc::new({
        let mut client = OpenAi::new(&config.openai_api_key, &config.chat_model)
            .with_embedding_model(&config.embedding_model);
        if let Some(base) = &config.openai_base_url {
            client = client.with_base_url(base);
        }
        client
    });

    let fetcher: Arc<dyn ArticleFetcher> = match &config.browserless_url {
        Some(base) => Arc::new(CloudArticleFetcher::new(BrowserlessClient::new(
            base,
            config.browserless_token.as_deref(),
        ))),
        None => {
            warn!("BROWSERLESS_URL not set; cloud scrapes will fail");
            Arc::new(UnconfiguredFetcher)
        }
    };

    let hub = Arc::new(ProbeHub::new(store.clone()));

    let deps = Arc::new(PipelineDeps {
        store: store.clone(),
        fetcher,
        llm: llm.clone(),
        embedder: llm,
        media: Arc::new(DisabledMediaProcessor),
        probes: hub.clone(),
    });

    let queue = TaskQueue::new(store.pool().clone());
    let pipeline = Pipeline::new(deps, queue.clone());

    // Pipeline workers share this process.
    let mut registry = TaskRegistry::new();
    pipeline.register(&mut registry);
    let pool = WorkerPool::new(queue.clone(), registry, PIPELINE_QUEUE, config.claim_timeout_secs);
    pool.start(config.pipeline_workers);

    reaper::start(store.clone(), config.probe_event_ttl_secs);

    let state = Arc::new(AppState {
        store,
        hub,
        pipeline,
        config: config.clone(),
    });

    let app = Router::new()
        // Health
        .route("/healthz", get(|| async { "ok" }))
        // Links
        .route("/api/links", post(rest::links::submit_link).get(rest::links::list_links))
        .route(
            "/api/links/{id}",
            get(rest::links::link_detail).delete(rest::links::delete_link),
        )
        .route("/api/search", get(rest::links::search_links))
        // Retry
        .route("/api/retry", post(rest::retry::retry_failed))
        .route("/api/retry/{id}", post(rest::retry::retry_one))
        // Device enrollment (no session)
        .route("/api/auth/device", post(rest::device::start_device_auth))
        .route("/api/auth/token", post(rest::device::poll_device_token))
        // Probe channel (bearer)
        .route("/api/probe/subscribe_events", get(rest::probe::subscribe_events))
        .route("/api/probe/receive_result", post(rest::probe::post_result))
        .route("/api/probe/status", get(rest::probe::probe_status))
        // Verification pages (session)
        .route("/auth/device", get(pages::verification_page))
        .route("/auth/device/authorize", post(pages::authorize_submit))
        .with_state(state)
        // Method + path + status + latency only.
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("linkmap coordinator listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
