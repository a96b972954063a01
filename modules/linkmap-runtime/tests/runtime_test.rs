//! Integration tests for the durable task runtime.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests
//! are skipped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use linkmap_runtime::{
    RetryStrategy, SpawnOptions, StepContext, TaskHandler, TaskQueue, TaskRegistry, TaskState,
    TaskStatus, WorkerPool,
};
use linkmap_store::LinkStore;
use serde_json::json;
use uuid::Uuid;

const TEST_QUEUE_LEASE: u64 = 30;

async fn test_queue() -> Option<TaskQueue> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = LinkStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;
    Some(TaskQueue::new(store.pool().clone()))
}

/// Unique queue name per test so tests share a database without
/// claiming each other's tasks.
fn queue_name() -> String {
    format!("test-{}", Uuid::new_v4().simple())
}

/// Poll task status until terminal or the deadline passes.
async fn wait_terminal(queue: &TaskQueue, task_id: Uuid) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = queue.status(task_id).await.unwrap().expect("task exists");
        if status.state.is_terminal() {
            return status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("task {task_id} did not reach a terminal state: {:?}", status.state);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

struct CountingHandler {
    calls: Arc<AtomicUsize>,
    fail_first: usize,
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn run(&self, params: serde_json::Value, ctx: StepContext) -> Result<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            anyhow::bail!("transient failure #{call}");
        }
        let doubled: i64 = ctx
            .step("double", || async {
                Ok(params["n"].as_i64().unwrap_or(0) * 2)
            })
            .await?;
        Ok(json!({"doubled": doubled}))
    }
}

// =========================================================================
// Queue primitives
// =========================================================================

#[tokio::test]
async fn spawn_reports_queued_status() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    let status = queue.status(id).await.unwrap().unwrap();
    assert_eq!(status.state, TaskState::Queued);
    assert_eq!(status.attempts, 0);
    assert!(status.result.is_none());
}

#[tokio::test]
async fn claim_is_exclusive_until_lease_expires() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    let claimed = queue.claim_next(&q, "w1", TEST_QUEUE_LEASE).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);

    // Held lease: nothing to claim.
    assert!(queue.claim_next(&q, "w2", TEST_QUEUE_LEASE).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_lease_is_reclaimed_without_consuming_an_attempt() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    // Zero-second lease expires immediately.
    let first = queue.claim_next(&q, "w1", 0).await.unwrap().unwrap();
    assert_eq!(first.id, id);

    let second = queue.claim_next(&q, "w2", TEST_QUEUE_LEASE).await.unwrap().unwrap();
    assert_eq!(second.id, id);
    assert_eq!(second.attempts, 0);
}

#[tokio::test]
async fn stale_worker_cannot_clobber_a_reassigned_task() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    let _stale = queue.claim_next(&q, "w1", 0).await.unwrap().unwrap();
    let _fresh = queue.claim_next(&q, "w2", TEST_QUEUE_LEASE).await.unwrap().unwrap();

    // w1's lease was reassigned to w2; its completion must not land.
    queue.complete(id, "w1", &json!({"from": "w1"})).await.unwrap();
    let status = queue.status(id).await.unwrap().unwrap();
    assert_eq!(status.state, TaskState::Claimed);

    queue.complete(id, "w2", &json!({"from": "w2"})).await.unwrap();
    let status = queue.status(id).await.unwrap().unwrap();
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.result.unwrap()["from"], "w2");
}

#[tokio::test]
async fn cancel_prevents_execution_and_is_terminal() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    assert!(queue.cancel(id).await.unwrap());
    assert!(queue.claim_next(&q, "w1", TEST_QUEUE_LEASE).await.unwrap().is_none());

    let status = queue.status(id).await.unwrap().unwrap();
    assert_eq!(status.state, TaskState::Cancelled);

    // Cancelling a terminal task is a no-op.
    assert!(!queue.cancel(id).await.unwrap());
}

// =========================================================================
// Step memoization
// =========================================================================

#[tokio::test]
async fn step_runs_once_and_memoizes_its_value() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    let ctx = StepContext::new(queue.clone(), id);
    let calls = Arc::new(AtomicUsize::new(0));

    let c = calls.clone();
    let v1: i64 = ctx
        .step("compute", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(41)
        })
        .await
        .unwrap();

    // A resumed handler re-invokes the same step; the closure must not run.
    let c = calls.clone();
    let v2: i64 = ctx
        .step("compute", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(999)
        })
        .await
        .unwrap();

    assert_eq!(v1, 41);
    assert_eq!(v2, 41);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_step_is_not_memoized() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let id = queue
        .spawn(&q, "noop", json!({}), SpawnOptions::default())
        .await
        .unwrap();

    let ctx = StepContext::new(queue.clone(), id);

    let first: Result<i64> = ctx.step("flaky", || async { anyhow::bail!("boom") }).await;
    assert!(first.is_err());

    let second: i64 = ctx.step("flaky", || async { Ok(7) }).await.unwrap();
    assert_eq!(second, 7);
}

// =========================================================================
// Worker pool
// =========================================================================

#[tokio::test]
async fn worker_executes_task_to_completion() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = TaskRegistry::new();
    registry.register(
        "double",
        Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: 0,
        }),
    );

    let pool = WorkerPool::new(queue.clone(), registry, &q, TEST_QUEUE_LEASE)
        .with_poll_interval(Duration::from_millis(25));
    let handles = pool.start(2);

    let id = queue
        .spawn(&q, "double", json!({"n": 21}), SpawnOptions::default())
        .await
        .unwrap();

    let status = wait_terminal(&queue, id).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.result.unwrap()["doubled"], 42);
    assert_eq!(status.attempts, 0);

    pool.shutdown();
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn failing_handler_retries_then_succeeds() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = TaskRegistry::new();
    registry.register(
        "double",
        Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: 1,
        }),
    );

    let pool = WorkerPool::new(queue.clone(), registry, &q, TEST_QUEUE_LEASE)
        .with_poll_interval(Duration::from_millis(25));
    let handles = pool.start(1);

    let id = queue
        .spawn(
            &q,
            "double",
            json!({"n": 3}),
            SpawnOptions::with_retry(3, RetryStrategy::Fixed { secs: 0 }),
        )
        .await
        .unwrap();

    let status = wait_terminal(&queue, id).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.result.unwrap()["doubled"], 6);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    pool.shutdown();
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn task_fails_after_max_attempts() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = TaskRegistry::new();
    registry.register(
        "double",
        Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: usize::MAX,
        }),
    );

    let pool = WorkerPool::new(queue.clone(), registry, &q, TEST_QUEUE_LEASE)
        .with_poll_interval(Duration::from_millis(25));
    let handles = pool.start(1);

    let id = queue
        .spawn(
            &q,
            "double",
            json!({"n": 1}),
            SpawnOptions::with_retry(2, RetryStrategy::Fixed { secs: 0 }),
        )
        .await
        .unwrap();

    let status = wait_terminal(&queue, id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.attempts, 2);
    assert!(status.last_error.unwrap().contains("transient failure"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    pool.shutdown();
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn unknown_kind_fails_without_retry() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    let pool = WorkerPool::new(queue.clone(), TaskRegistry::new(), &q, TEST_QUEUE_LEASE)
        .with_poll_interval(Duration::from_millis(25));
    let handles = pool.start(1);

    let id = queue
        .spawn(
            &q,
            "nobody-home",
            json!({}),
            SpawnOptions::with_retry(3, RetryStrategy::Fixed { secs: 0 }),
        )
        .await
        .unwrap();

    let status = wait_terminal(&queue, id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.last_error.as_deref(), Some("unknown task kind"));

    pool.shutdown();
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn memoized_steps_are_skipped_on_retry() {
    let Some(queue) = test_queue().await else { return };
    let q = queue_name();

    // Handler whose first step always succeeds and whose second step
    // fails on the first attempt. On retry, step one must be skipped.
    struct TwoStep {
        step_one_runs: Arc<AtomicUsize>,
        step_two_tries: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskHandler for TwoStep {
        async fn run(
            &self,
            _params: serde_json::Value,
            ctx: StepContext,
        ) -> Result<serde_json::Value> {
            let ones = self.step_one_runs.clone();
            let a: i64 = ctx
                .step("one", || async move {
                    ones.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await?;

            let twos = self.step_two_tries.clone();
            let b: i64 = ctx
                .step("two", || async move {
                    if twos.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("second step blew up");
                    }
                    Ok(2)
                })
                .await?;

            Ok(json!({"sum": a + b}))
        }
    }

    let step_one_runs = Arc::new(AtomicUsize::new(0));
    let step_two_tries = Arc::new(AtomicUsize::new(0));
    let mut registry = TaskRegistry::new();
    registry.register(
        "two-step",
        Arc::new(TwoStep {
            step_one_runs: step_one_runs.clone(),
            step_two_tries: step_two_tries.clone(),
        }),
    );

    let pool = WorkerPool::new(queue.clone(), registry, &q, TEST_QUEUE_LEASE)
        .with_poll_interval(Duration::from_millis(25));
    let handles = pool.start(1);

    let id = queue
        .spawn(
            &q,
            "two-step",
            json!({}),
            SpawnOptions::with_retry(3, RetryStrategy::Fixed { secs: 0 }),
        )
        .await
        .unwrap();

    let status = wait_terminal(&queue, id).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.result.unwrap()["sum"], 3);
    // Step one executed exactly once across both attempts.
    assert_eq!(step_one_runs.load(Ordering::SeqCst), 1);
    assert_eq!(step_two_tries.load(Ordering::SeqCst), 2);

    pool.shutdown();
    for h in handles {
        let _ = h.await;
    }
}
