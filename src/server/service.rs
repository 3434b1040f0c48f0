//! Request schema and the entry point that turns a request into a running
//! task with a status stream.

use crate::error::TaskError;
use crate::server::core::ServerCore;
use crate::server::runner::run_task;
use crate::task::{StateCode, TaskBuilder, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOperation {
    List,
    Apply,
    Undo,
}

/// One task request as received off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub operation: TaskOperation,
    #[serde(default)]
    pub argv: Vec<String>,
}

impl ServerCore {
    fn build_task(self: &Arc<Self>, request: &TaskRequest) -> Result<TaskBuilder, TaskError> {
        match request.operation {
            TaskOperation::List => Ok(TaskBuilder::list(self.clone())),
            TaskOperation::Apply => {
                let yaml = request.argv.first().ok_or_else(|| {
                    TaskError::Parse("apply requires the playbook text as its argument".to_string())
                })?;
                TaskBuilder::apply(self.clone(), yaml)
            }
            TaskOperation::Undo => {
                let name = request.argv.first().ok_or_else(|| {
                    TaskError::Parse("undo requires a playbook name as its argument".to_string())
                })?;
                TaskBuilder::undo(self.clone(), name)
            }
        }
    }

    /// Build and launch the requested task. The returned receiver carries the
    /// task's status stream; build failures surface as a single `error`
    /// status instead of a spawned task.
    pub fn execute_task(self: &Arc<Self>, request: TaskRequest) -> mpsc::Receiver<TaskStatus> {
        let (tx, rx) = mpsc::channel(64);
        match self.build_task(&request) {
            Ok(builder) => {
                info!(operation = ?request.operation, "task accepted");
                let executor = builder.build();
                tokio::spawn(run_task(self.clone(), executor, tx));
            }
            Err(err) => {
                let _ = tx.try_send(TaskStatus::new(StateCode::Error, err.to_string()));
            }
        }
        rx
    }
}
