use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Claimed,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Claimed => "claimed",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskState::Queued),
            "claimed" => Some(TaskState::Claimed),
            "completed" => Some(TaskState::Completed),
            "failed" => Some(TaskState::Failed),
            "cancelled" => Some(TaskState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Backoff schedule applied between failed attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryStrategy {
    Exponential {
        base_secs: u64,
        factor: u32,
        max_secs: u64,
    },
    Fixed {
        secs: u64,
    },
}

impl RetryStrategy {
    /// Delay before the next attempt, given how many attempts have
    /// already failed (1 after the first failure).
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        match self {
            RetryStrategy::Fixed { secs } => Duration::from_secs(*secs),
            RetryStrategy::Exponential {
                base_secs,
                factor,
                max_secs,
            } => {
                let exp = failed_attempts.saturating_sub(1).min(31);
                let scaled = base_secs.saturating_mul((*factor as u64).saturating_pow(exp));
                Duration::from_secs(scaled.min(*max_secs))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Total attempts before the task is failed. 0 is treated as 1.
    pub max_attempts: u32,
    pub retry: Option<RetryStrategy>,
}

impl SpawnOptions {
    pub fn with_retry(max_attempts: u32, retry: RetryStrategy) -> Self {
        Self {
            max_attempts,
            retry: Some(retry),
        }
    }
}

/// A task handed to a worker under a lease.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: Uuid,
    pub kind: String,
    pub params: serde_json::Value,
    /// Failed attempts so far (0 on the first run).
    pub attempts: i32,
    pub max_attempts: i32,
    pub retry: Option<RetryStrategy>,
}

/// Externally visible task state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub id: Uuid,
    pub state: TaskState,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
}
