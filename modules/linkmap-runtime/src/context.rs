use std::future::Future;

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::queue::TaskQueue;

/// Handed to a task handler. `step` runs a named unit of work at most
/// once per task: the first successful return is persisted, and every
/// later invocation (retry, lease reclaim, worker restart) returns the
/// memoized value without re-running the closure.
#[derive(Clone)]
pub struct StepContext {
    queue: TaskQueue,
    task_id: Uuid,
}

impl StepContext {
    pub fn new(queue: TaskQueue, task_id: Uuid) -> Self {
        Self { queue, task_id }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub async fn step<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self
            .queue
            .get_step(self.task_id, name)
            .await
            .with_context(|| format!("reading memoized step '{name}'"))?
        {
            tracing::debug!(task_id = %self.task_id, step = name, "step memoized, skipping");
            return serde_json::from_value(value)
                .with_context(|| format!("decoding memoized step '{name}'"));
        }

        let out = f().await.with_context(|| format!("step '{name}'"))?;

        let value = serde_json::to_value(&out)
            .with_context(|| format!("encoding step '{name}' result"))?;
        self.queue
            .put_step(self.task_id, name, &value)
            .await
            .with_context(|| format!("persisting step '{name}'"))?;

        Ok(out)
    }
}
