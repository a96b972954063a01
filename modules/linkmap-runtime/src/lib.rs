//! Durable task runtime — a persistent queue with per-task step
//! memoization. Each task is a sequence of named steps; a step's return
//! value is persisted on first success so a resumed task skips straight
//! to the step that was in flight when the worker died.

mod context;
mod queue;
mod types;
mod worker;

pub use context::StepContext;
pub use queue::TaskQueue;
pub use types::{ClaimedTask, RetryStrategy, SpawnOptions, TaskState, TaskStatus};
pub use worker::{TaskHandler, TaskRegistry, WorkerPool};
