use anyhow::{Context, Result};
use tracing::info;

use linkmap_common::LinkStatus;
use linkmap_store::LinkFields;

use crate::deps::PipelineDeps;

const SYSTEM_PROMPT: &str = "\
You connect a newly saved link to pages the reader saved earlier. Given \
the new page and its most similar saved pages, write one short paragraph \
of plain text pointing out what ties them together or what is new here. \
No preamble, no markdown.";

/// Insight step: synthesize a short note from the link and its related
/// set, then mark the link analyzed.
pub async fn insight(deps: &PipelineDeps, link_id: i64, related_ids: &[i64]) -> Result<()> {
    let link = deps
        .store
        .get_link(link_id)
        .await?
        .with_context(|| format!("link {link_id} vanished before insight"))?;

    let mut context = format!(
        "New link:\nTitle: {}\nURL: {}\nSummary: {}\n",
        link.title.as_deref().unwrap_or("(untitled)"),
        link.url,
        link.summary.as_deref().unwrap_or(""),
    );

    if related_ids.is_empty() {
        context.push_str("\nNo related saved pages yet.\n");
    } else {
        context.push_str("\nRelated saved pages:\n");
        for id in related_ids {
            if let Some(rel) = deps.store.get_link(*id).await? {
                context.push_str(&format!(
                    "- {} — {}\n  {}\n",
                    rel.title.as_deref().unwrap_or("(untitled)"),
                    rel.url,
                    rel.summary.as_deref().unwrap_or(""),
                ));
            }
        }
    }

    let text = deps.llm.complete(SYSTEM_PROMPT, &context).await?;
    info!(link_id, "insight: persisting and marking analyzed");

    deps.store
        .update_link_fields(
            link_id,
            LinkFields {
                insight: Some(text.trim().to_string()),
                ..Default::default()
            },
        )
        .await?;
    deps.store
        .set_link_status(link_id, LinkStatus::Analyzed, None)
        .await?;

    Ok(())
}
