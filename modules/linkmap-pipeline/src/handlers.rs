use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use linkmap_common::{truncate_chars, LinkStatus};
use linkmap_runtime::{StepContext, TaskHandler};

use crate::deps::PipelineDeps;
use crate::permanent::is_permanent_scrape_error;
use crate::steps;
use crate::types::{ProcessLinkParams, RefreshRelatedParams, ScrapeOutcome};

/// Stored link error messages are capped at this many characters.
const MAX_ERROR_CHARS: usize = 1000;

/// `process-link`: the full enrichment workflow for one URL.
pub(crate) struct ProcessLinkHandler {
    pub(crate) deps: Arc<PipelineDeps>,
}

#[async_trait]
impl TaskHandler for ProcessLinkHandler {
    async fn run(
        &self,
        params: serde_json::Value,
        ctx: StepContext,
    ) -> Result<serde_json::Value> {
        let p: ProcessLinkParams =
            serde_json::from_value(params).context("decoding process-link params")?;

        let link_id = match p.link_id {
            Some(id) => {
                self.deps
                    .store
                    .set_link_status(id, LinkStatus::Pending, None)
                    .await?;
                id
            }
            None => {
                let (id, existing) = self.deps.store.upsert_link(p.user_id, &p.url).await?;
                info!(link_id = id, existing, url = %p.url, "process-link starting");
                id
            }
        };

        match drive(&self.deps, &ctx, link_id, &p).await {
            Ok(result) => Ok(result),
            Err(e) => {
                let message = format!("{e:#}");
                if let Err(store_err) = self
                    .deps
                    .store
                    .set_link_status(
                        link_id,
                        LinkStatus::Error,
                        Some(&truncate_chars(&message, MAX_ERROR_CHARS)),
                    )
                    .await
                {
                    error!(link_id, error = %store_err, "failed to record link error");
                }

                if is_permanent_scrape_error(&message) {
                    // The URL was a file, not a page. Recorded on the
                    // link; retrying would hit the same wall.
                    info!(link_id, "permanent scrape error, completing without retry");
                    Ok(json!({"status": "error", "permanent": true}))
                } else {
                    Err(e)
                }
            }
        }
    }
}

async fn drive(
    deps: &Arc<PipelineDeps>,
    ctx: &StepContext,
    link_id: i64,
    p: &ProcessLinkParams,
) -> Result<serde_json::Value> {
    let outcome: ScrapeOutcome = ctx
        .step("scrape", || {
            steps::scrape(deps, link_id, p.user_id, &p.url, p.scrape_data.as_ref())
        })
        .await?;

    let checkpoint = match outcome {
        // Clean early return: the task is complete, and a fresh task
        // picks the link up when the probe posts its result.
        ScrapeOutcome::Suspended => return Ok(json!({"status": "waiting_probe"})),
        ScrapeOutcome::Scraped(cp) => cp,
    };

    ctx.step("summarize", || {
        steps::summarize(deps, link_id, &p.url, &checkpoint.ocr_texts)
    })
    .await?;

    let vector: Vec<f32> = ctx.step("embed", || steps::embed(deps, link_id)).await?;

    let related: Vec<(i64, f64)> = ctx
        .step("related", || {
            steps::related(deps, link_id, p.user_id, vector.clone())
        })
        .await?;

    let related_ids: Vec<i64> = related.iter().map(|(id, _)| *id).collect();
    ctx.step("insight", || steps::insight(deps, link_id, &related_ids))
        .await?;

    ctx.step("export", || steps::export(deps, link_id)).await?;

    Ok(json!({"status": "analyzed", "link_id": link_id}))
}

/// `refresh-related`: re-run the back half of the pipeline for an
/// already-analyzed link. Never re-scrapes or re-summarizes.
pub(crate) struct RefreshRelatedHandler {
    pub(crate) deps: Arc<PipelineDeps>,
}

#[async_trait]
impl TaskHandler for RefreshRelatedHandler {
    async fn run(
        &self,
        params: serde_json::Value,
        ctx: StepContext,
    ) -> Result<serde_json::Value> {
        let p: RefreshRelatedParams =
            serde_json::from_value(params).context("decoding refresh-related params")?;
        let deps = &self.deps;

        let link = deps
            .store
            .get_link(p.link_id)
            .await?
            .with_context(|| format!("link {} not found", p.link_id))?;

        let vector: Vec<f32> = match &link.summary_vector {
            Some(v) => v.to_vec(),
            None => ctx.step("embed", || steps::embed(deps, p.link_id)).await?,
        };

        let related: Vec<(i64, f64)> = ctx
            .step("related", || {
                steps::related(deps, p.link_id, link.user_id, vector.clone())
            })
            .await?;

        let related_ids: Vec<i64> = related.iter().map(|(id, _)| *id).collect();
        ctx.step("insight", || steps::insight(deps, p.link_id, &related_ids))
            .await?;

        ctx.step("export", || steps::export(deps, p.link_id)).await?;

        Ok(json!({"status": "analyzed", "link_id": p.link_id}))
    }
}
