use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use linkmap_common::truncate_chars;

use crate::types::{ClaimedTask, RetryStrategy, SpawnOptions, TaskState, TaskStatus};

/// Persisted error messages are capped at this many characters.
const MAX_ERROR_CHARS: usize = 1000;

pub type Result<T> = std::result::Result<T, sqlx::Error>;

/// The persistent task queue. Claims take a lease; an expired lease
/// returns the task to the queue without consuming an attempt.
#[derive(Clone)]
pub struct TaskQueue {
    pool: PgPool,
}

impl TaskQueue {
    /// Runs on the store gateway's pool — the runtime opens no
    /// connections of its own.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new task. Returns its id.
    pub async fn spawn(
        &self,
        queue: &str,
        kind: &str,
        params: serde_json::Value,
        opts: SpawnOptions,
    ) -> Result<Uuid> {
        let max_attempts = opts.max_attempts.max(1) as i32;
        let retry = opts
            .retry
            .as_ref()
            .map(|r| serde_json::to_value(r).expect("retry strategy serializes"));

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO tasks (queue, kind, params, max_attempts, retry_strategy)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(kind)
        .bind(&params)
        .bind(max_attempts)
        .bind(retry)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(task_id = %id, kind, queue, "task spawned");
        Ok(id)
    }

    /// Claim the next runnable task under a lease. Tasks whose lease
    /// expired (worker crash, hang) are reclaimable immediately.
    pub async fn claim_next(
        &self,
        queue: &str,
        worker_id: &str,
        lease_secs: u64,
    ) -> Result<Option<ClaimedTask>> {
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'claimed',
                claimed_by = $2,
                lease_expires_at = now() + make_interval(secs => $3),
                updated_at = now()
            WHERE id = (
                SELECT id FROM tasks
                WHERE queue = $1
                  AND ((state = 'queued' AND run_after <= now())
                    OR (state = 'claimed' AND lease_expires_at < now()))
                ORDER BY run_after ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, kind, params, attempts, max_attempts, retry_strategy
            "#,
        )
        .bind(queue)
        .bind(worker_id)
        .bind(lease_secs as f64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let retry: Option<serde_json::Value> = row.try_get("retry_strategy")?;
        let retry = retry.and_then(|v| serde_json::from_value::<RetryStrategy>(v).ok());

        Ok(Some(ClaimedTask {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            params: row.try_get("params")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            retry,
        }))
    }

    /// Persist the handler's return value and complete the task. Guarded
    /// by the claim so a worker whose lease was reassigned cannot clobber
    /// the new owner's run.
    pub async fn complete(
        &self,
        task_id: Uuid,
        worker_id: &str,
        result: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'completed', result = $3, updated_at = now()
            WHERE id = $1 AND state = 'claimed' AND claimed_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a handler failure: consume an attempt and either requeue
    /// with the retry delay or fail the task for good.
    pub async fn fail(&self, task: &ClaimedTask, worker_id: &str, error: &str) -> Result<()> {
        let failed_attempts = (task.attempts + 1) as u32;
        let exhausted = failed_attempts as i32 >= task.max_attempts;

        let delay = if exhausted {
            ChronoDuration::zero()
        } else {
            let d = task
                .retry
                .as_ref()
                .map(|r| r.delay(failed_attempts))
                .unwrap_or_default();
            ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::zero())
        };

        let next_state = if exhausted {
            TaskState::Failed
        } else {
            TaskState::Queued
        };

        sqlx::query(
            r#"
            UPDATE tasks
            SET state = $3,
                attempts = $4,
                last_error = $5,
                run_after = $6,
                updated_at = now()
            WHERE id = $1 AND state = 'claimed' AND claimed_by = $2
            "#,
        )
        .bind(task.id)
        .bind(worker_id)
        .bind(next_state.as_str())
        .bind(failed_attempts as i32)
        .bind(truncate_chars(error, MAX_ERROR_CHARS))
        .bind(Utc::now() + delay)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            task_id = %task.id,
            kind = %task.kind,
            attempts = failed_attempts,
            exhausted,
            "task attempt failed"
        );
        Ok(())
    }

    /// Cancel a task that has not reached a terminal state. A cancelled
    /// task never retries. Returns whether anything was cancelled.
    pub async fn cancel(&self, task_id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks SET state = 'cancelled', updated_at = now()
            WHERE id = $1 AND state IN ('queued', 'claimed')
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn status(&self, task_id: Uuid) -> Result<Option<TaskStatus>> {
        let row = sqlx::query(
            "SELECT id, state, attempts, last_error, result FROM tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state: String = row.try_get("state")?;
        Ok(Some(TaskStatus {
            id: row.try_get("id")?,
            state: TaskState::parse(&state).unwrap_or(TaskState::Failed),
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            result: row.try_get("result")?,
        }))
    }

    // --- step memoization ---

    pub(crate) async fn get_step(
        &self,
        task_id: Uuid,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM task_steps WHERE task_id = $1 AND step_name = $2",
        )
        .bind(task_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    /// First write wins: a concurrent replay that raced the original
    /// keeps the original's value.
    pub(crate) async fn put_step(
        &self,
        task_id: Uuid,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_steps (task_id, step_name, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (task_id, step_name) DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
