use serde::{Deserialize, Serialize};

use linkmap_common::ScrapeData;

/// Parameters of a `process-link` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLinkParams {
    pub user_id: i64,
    pub url: String,
    /// Set when re-processing an existing link (retry, probe result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<i64>,
    /// Probe-supplied payload; its presence selects the probe-supplied
    /// scrape sub-path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_data: Option<ScrapeData>,
}

/// Parameters of a `refresh-related` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRelatedParams {
    pub link_id: i64,
}

/// Memoized result of the scrape step. Checkpoints stay compact — full
/// markdown lives in the store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    /// A probe event was created and the task finished early; the
    /// pipeline restarts when the probe responds.
    Suspended,
    Scraped(ScrapeCheckpoint),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeCheckpoint {
    pub title: Option<String>,
    pub og_description: Option<String>,
    pub site_name: Option<String>,
    pub markdown_length: usize,
    pub ocr_texts: Vec<String>,
}

impl ScrapeCheckpoint {
    pub fn from_data(data: &ScrapeData, ocr_texts: Vec<String>) -> Self {
        Self {
            title: data.display_title().map(String::from),
            og_description: data.og_description.clone(),
            site_name: data.og_site_name.clone(),
            markdown_length: data.markdown.len(),
            ocr_texts,
        }
    }
}

/// Memoized result of the summarize step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeCheckpoint {
    pub summary: String,
    pub tags: Vec<String>,
}
