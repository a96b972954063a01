use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::context::StepContext;
use crate::queue::TaskQueue;
use crate::types::ClaimedTask;

/// A task kind's implementation. Deterministic modulo its steps.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, params: serde_json::Value, ctx: StepContext)
        -> Result<serde_json::Value>;
}

/// Binds task kinds to handlers.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind.to_string(), handler);
    }

    fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }
}

/// Cooperative polling workers over one queue. Workers run tasks in
/// parallel; concurrency is the worker count.
pub struct WorkerPool {
    queue: TaskQueue,
    registry: Arc<TaskRegistry>,
    queue_name: String,
    lease_secs: u64,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(
        queue: TaskQueue,
        registry: TaskRegistry,
        queue_name: &str,
        lease_secs: u64,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            registry: Arc::new(registry),
            queue_name: queue_name.to_string(),
            lease_secs,
            poll_interval: Duration::from_millis(500),
            shutdown_tx,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawn `n` worker loops. Handles resolve once shutdown completes.
    pub fn start(&self, workers: usize) -> Vec<JoinHandle<()>> {
        info!(
            queue = %self.queue_name,
            workers,
            lease_secs = self.lease_secs,
            "starting worker pool"
        );
        (0..workers)
            .map(|i| {
                let queue = self.queue.clone();
                let registry = self.registry.clone();
                let queue_name = self.queue_name.clone();
                let worker_id = format!("{}-worker-{}", std::process::id(), i);
                let lease_secs = self.lease_secs;
                let poll_interval = self.poll_interval;
                let mut shutdown_rx = self.shutdown_tx.subscribe();

                tokio::spawn(async move {
                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }

                        match queue.claim_next(&queue_name, &worker_id, lease_secs).await {
                            Ok(Some(task)) => {
                                run_task(&queue, &registry, &worker_id, task).await;
                            }
                            Ok(None) => {
                                tokio::select! {
                                    _ = tokio::time::sleep(poll_interval) => {}
                                    _ = shutdown_rx.changed() => {}
                                }
                            }
                            Err(e) => {
                                error!(error = %e, worker = %worker_id, "claim failed");
                                tokio::select! {
                                    _ = tokio::time::sleep(poll_interval) => {}
                                    _ = shutdown_rx.changed() => {}
                                }
                            }
                        }
                    }
                    info!(worker = %worker_id, "worker stopped");
                })
            })
            .collect()
    }

    /// Signal all workers to stop after their current task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_task(
    queue: &TaskQueue,
    registry: &TaskRegistry,
    worker_id: &str,
    task: ClaimedTask,
) {
    let Some(handler) = registry.get(&task.kind) else {
        // No handler will ever appear for this kind; don't retry.
        error!(task_id = %task.id, kind = %task.kind, "unknown task kind");
        let doomed = ClaimedTask {
            attempts: task.max_attempts - 1,
            ..task.clone()
        };
        if let Err(e) = queue.fail(&doomed, worker_id, "unknown task kind").await {
            error!(error = %e, task_id = %task.id, "failed to record unknown-kind error");
        }
        return;
    };

    let ctx = StepContext::new(queue.clone(), task.id);
    match handler.run(task.params.clone(), ctx).await {
        Ok(result) => {
            if let Err(e) = queue.complete(task.id, worker_id, &result).await {
                error!(error = %e, task_id = %task.id, "failed to complete task");
            }
        }
        Err(e) => {
            if let Err(store_err) = queue.fail(&task, worker_id, &format!("{e:#}")).await {
                error!(error = %store_err, task_id = %task.id, "failed to record task error");
            }
        }
    }
}
