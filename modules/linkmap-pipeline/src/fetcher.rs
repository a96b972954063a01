use anyhow::Result;
use async_trait::async_trait;

use browserless_client::BrowserlessClient;
use linkmap_common::{extract, ScrapeData};

use crate::deps::ArticleFetcher;

/// Cloud-side article extraction: render through Browserless, then
/// Readability markdown + og tags.
pub struct CloudArticleFetcher {
    client: BrowserlessClient,
}

impl CloudArticleFetcher {
    pub fn new(client: BrowserlessClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArticleFetcher for CloudArticleFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapeData> {
        let html = self.client.content(url).await?;
        Ok(extract::scrape_data_from_html(&html, url))
    }
}
