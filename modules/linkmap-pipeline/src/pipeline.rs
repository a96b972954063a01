use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use linkmap_common::ScrapeData;
use linkmap_runtime::{RetryStrategy, SpawnOptions, TaskQueue, TaskRegistry};
use linkmap_store::StoreError;

use crate::deps::PipelineDeps;
use crate::handlers::{ProcessLinkHandler, RefreshRelatedHandler};
use crate::types::{ProcessLinkParams, RefreshRelatedParams};

pub const PIPELINE_QUEUE: &str = "pipeline";
pub const PROCESS_LINK: &str = "process-link";
pub const REFRESH_RELATED: &str = "refresh-related";

fn process_link_opts() -> SpawnOptions {
    SpawnOptions::with_retry(
        3,
        RetryStrategy::Exponential {
            base_secs: 10,
            factor: 2,
            max_secs: 300,
        },
    )
}

fn refresh_related_opts() -> SpawnOptions {
    SpawnOptions::with_retry(2, RetryStrategy::Fixed { secs: 30 })
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeResultError {
    #[error("unknown probe event")]
    UnknownEvent,

    #[error("probe event belongs to another user")]
    ForeignEvent,

    #[error("referenced link no longer exists")]
    MissingLink,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to spawn task: {0}")]
    Spawn(sqlx::Error),
}

/// Front door of the enrichment workflow: registers the task kinds and
/// spawns tasks. Admission handlers always spawn-and-return.
#[derive(Clone)]
pub struct Pipeline {
    deps: Arc<PipelineDeps>,
    queue: TaskQueue,
    queue_name: String,
}

impl Pipeline {
    pub fn new(deps: Arc<PipelineDeps>, queue: TaskQueue) -> Self {
        Self {
            deps,
            queue,
            queue_name: PIPELINE_QUEUE.to_string(),
        }
    }

    /// Use a non-default queue name. Lets deployments (and tests) share
    /// a database without sharing a worker pool.
    pub fn with_queue_name(mut self, name: &str) -> Self {
        self.queue_name = name.to_string();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Bind both task kinds into a runtime registry.
    pub fn register(&self, registry: &mut TaskRegistry) {
        registry.register(
            PROCESS_LINK,
            Arc::new(ProcessLinkHandler {
                deps: self.deps.clone(),
            }),
        );
        registry.register(
            REFRESH_RELATED,
            Arc::new(RefreshRelatedHandler {
                deps: self.deps.clone(),
            }),
        );
    }

    /// Enqueue processing of a submitted URL.
    pub async fn spawn_process_link(
        &self,
        user_id: i64,
        url: &str,
    ) -> Result<Uuid, sqlx::Error> {
        self.spawn(ProcessLinkParams {
            user_id,
            url: url.to_string(),
            link_id: None,
            scrape_data: None,
        })
        .await
    }

    /// Enqueue re-processing of an existing link (retry paths).
    pub async fn respawn_link(
        &self,
        user_id: i64,
        url: &str,
        link_id: i64,
    ) -> Result<Uuid, sqlx::Error> {
        self.spawn(ProcessLinkParams {
            user_id,
            url: url.to_string(),
            link_id: Some(link_id),
            scrape_data: None,
        })
        .await
    }

    async fn spawn(&self, params: ProcessLinkParams) -> Result<Uuid, sqlx::Error> {
        self.queue
            .spawn(
                &self.queue_name,
                PROCESS_LINK,
                serde_json::to_value(&params).expect("params serialize"),
                process_link_opts(),
            )
            .await
    }

    pub async fn spawn_refresh_related(&self, link_id: i64) -> Result<Uuid, sqlx::Error> {
        self.queue
            .spawn(
                &self.queue_name,
                REFRESH_RELATED,
                serde_json::to_value(&RefreshRelatedParams { link_id })
                    .expect("params serialize"),
                refresh_related_opts(),
            )
            .await
    }

    /// Probe result entry point. The suspended task already finished;
    /// this spawns a fresh `process-link` carrying the probe payload,
    /// joined to the same link.
    pub async fn handle_probe_result(
        &self,
        event_id: Uuid,
        caller_user_id: i64,
        data: ScrapeData,
    ) -> Result<Uuid, ProbeResultError> {
        let event = self
            .deps
            .store
            .get_probe_event(event_id)
            .await?
            .ok_or(ProbeResultError::UnknownEvent)?;

        if event.user_id != caller_user_id {
            return Err(ProbeResultError::ForeignEvent);
        }

        let link = self
            .deps
            .store
            .get_link(event.link_id)
            .await?
            .ok_or(ProbeResultError::MissingLink)?;

        let task_id = self
            .queue
            .spawn(
                &self.queue_name,
                PROCESS_LINK,
                serde_json::to_value(&ProcessLinkParams {
                    user_id: link.user_id,
                    url: link.url.clone(),
                    link_id: Some(link.id),
                    scrape_data: Some(data),
                })
                .expect("params serialize"),
                process_link_opts(),
            )
            .await
            .map_err(ProbeResultError::Spawn)?;

        info!(
            event_id = %event_id,
            link_id = link.id,
            task_id = %task_id,
            "probe result accepted, pipeline re-spawned"
        );
        Ok(task_id)
    }
}
