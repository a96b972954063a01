use anyhow::Result;
use tracing::info;

use linkmap_common::{MAX_RELATIONS, SCORE_THRESHOLD};

use crate::deps::PipelineDeps;

/// How many candidates the vector search considers before thresholding.
const SEARCH_CANDIDATES: i64 = 10;

/// Related step: cosine search over summary vectors, threshold, cap,
/// persist. Returns the retained `(link_id, score)` pairs.
pub async fn related(
    deps: &PipelineDeps,
    link_id: i64,
    user_id: i64,
    vector: Vec<f32>,
) -> Result<Vec<(i64, f64)>> {
    let hits = deps
        .store
        .vector_search(
            &pgvector::Vector::from(vector),
            user_id,
            link_id,
            SEARCH_CANDIDATES,
        )
        .await?;

    let mut retained: Vec<(i64, f64)> = hits
        .into_iter()
        .filter(|(_, score)| *score >= SCORE_THRESHOLD)
        .collect();

    // Deterministic order: higher score first, then lower id.
    retained.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    retained.truncate(MAX_RELATIONS);

    info!(link_id, related = retained.len(), "related: saving relations");
    deps.store.save_relations(link_id, &retained).await?;

    Ok(retained)
}
