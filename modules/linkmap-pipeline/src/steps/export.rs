use anyhow::Result;

use crate::deps::PipelineDeps;

/// Export step. Currently a no-op hook: it participates in step
/// memoization so downstream export targets can be added without
/// touching the handler flow.
pub async fn export(_deps: &PipelineDeps, _link_id: i64) -> Result<bool> {
    Ok(true)
}
