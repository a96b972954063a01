use anyhow::{Context, Result};
use tracing::info;

use crate::deps::PipelineDeps;

/// Embed step: vectorize the stored summary. Returns the vector so the
/// related step avoids a re-read.
pub async fn embed(deps: &PipelineDeps, link_id: i64) -> Result<Vec<f32>> {
    let link = deps
        .store
        .get_link(link_id)
        .await?
        .with_context(|| format!("link {link_id} vanished before embed"))?;

    let summary = link
        .summary
        .filter(|s| !s.is_empty())
        .with_context(|| format!("link {link_id} has no summary to embed"))?;

    let vector = deps.embedder.embed(&summary).await?;
    info!(link_id, dims = vector.len(), "embed: storing summary vector");

    deps.store
        .set_summary_vector(link_id, pgvector::Vector::from(vector.clone()))
        .await?;

    Ok(vector)
}
