use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use ai_client::{ChatAgent, EmbedAgent};
use linkmap_common::{MediaItem, ScrapeData};
use linkmap_store::{LinkStore, ProbeEvent};

/// Cloud-side article extraction: JS-capable fetch plus content
/// extraction, producing the same payload shape a probe posts back.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapeData>;
}

/// Image download + OCR helper. Failures here are non-fatal to the
/// scrape step.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn ocr_texts(&self, link_id: i64, media: &[MediaItem]) -> Result<Vec<String>>;
}

/// No-op media processing for deployments without the OCR helper.
pub struct DisabledMediaProcessor;

#[async_trait]
impl MediaProcessor for DisabledMediaProcessor {
    async fn ocr_texts(&self, _link_id: i64, _media: &[MediaItem]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Push side of the probe bridge, as seen from the scrape step.
#[async_trait]
pub trait ProbeNotifier: Send + Sync {
    async fn push_scrape_request(&self, event: &ProbeEvent) -> Result<()>;
}

/// Everything a pipeline step may touch.
pub struct PipelineDeps {
    pub store: LinkStore,
    pub fetcher: Arc<dyn ArticleFetcher>,
    pub llm: Arc<dyn ChatAgent>,
    pub embedder: Arc<dyn EmbedAgent>,
    pub media: Arc<dyn MediaProcessor>,
    pub probes: Arc<dyn ProbeNotifier>,
}
