//! Step: a named unit of orchestration logic operating on the shared task
//! environment. Steps return their outcome synchronously to the Executor;
//! progress and summary lines go through the update emitter.

use crate::task::env::TaskEnv;
use crate::task::update::{StateCode, UpdateEmitter};
use async_trait::async_trait;

/// Result of one step execution. Recoverable per-item failures are reported
/// as summary updates by the step itself and still count as `Continue`.
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    /// Task-fatal failure. The Executor publishes this as the terminal
    /// `error` update and halts the run.
    Fatal(String),
}

#[async_trait]
pub trait Step: Send + Sync {
    /// State code announced before the step runs, and used to tag its updates.
    fn id(&self) -> StateCode;

    async fn run(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome;
}
