//! Task status schema and the emitter handle steps use to report progress.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Machine-readable state code carried by every status update. `error` is
/// reserved: it is always the last message on a stream and marks the task
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateCode {
    #[serde(rename = "list")]
    List,
    #[serde(rename = "fetchip")]
    FetchIp,
    #[serde(rename = "dns")]
    Dns,
    #[serde(rename = "routes")]
    Routes,
    #[serde(rename = "notify")]
    Notify,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "push_summary")]
    PushSummary,
    #[serde(rename = "lock_add")]
    LockAdd,
    #[serde(rename = "prep_ctx")]
    PrepCtx,
    #[serde(rename = "undo_dns")]
    UndoDns,
    #[serde(rename = "undo_routes")]
    UndoRoutes,
    #[serde(rename = "swap")]
    Swap,
    #[serde(rename = "finalize")]
    Finalize,
}

impl StateCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StateCode::List => "list",
            StateCode::FetchIp => "fetchip",
            StateCode::Dns => "dns",
            StateCode::Routes => "routes",
            StateCode::Notify => "notify",
            StateCode::Error => "error",
            StateCode::PushSummary => "push_summary",
            StateCode::LockAdd => "lock_add",
            StateCode::PrepCtx => "prep_ctx",
            StateCode::UndoDns => "undo_dns",
            StateCode::UndoRoutes => "undo_routes",
            StateCode::Swap => "swap",
            StateCode::Finalize => "finalize",
        }
    }

    /// Human description of what the server is doing in this state. Free-form
    /// states carry their meaning in the status text instead.
    pub fn describe(self) -> &'static str {
        match self {
            StateCode::List => "List of playbooks",
            StateCode::FetchIp => "Fetching IP Addresses of hosts",
            StateCode::Dns => "Applying DNS records",
            StateCode::Routes => "Adding static routes",
            StateCode::Error => "During execution of the task following failed:",
            StateCode::UndoDns => "Undoing DNS records",
            StateCode::UndoRoutes => "Undoing static routes",
            StateCode::LockAdd => "Locking playbook and adding to DB",
            StateCode::PrepCtx => "Preparing for operation",
            StateCode::Notify
            | StateCode::PushSummary
            | StateCode::Swap
            | StateCode::Finalize => "",
        }
    }
}

/// One status update on a task stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state_code: StateCode,
    pub state_text: String,
    pub op_desc: String,
}

impl TaskStatus {
    pub fn new(state_code: StateCode, state_text: impl Into<String>) -> Self {
        Self {
            state_code,
            state_text: state_text.into(),
            op_desc: state_code.describe().to_string(),
        }
    }
}

/// Handle through which steps (and the Executor itself) publish updates to the
/// caller's stream. Delivery failures mean the caller went away; the task is
/// not interrupted for that.
#[derive(Clone)]
pub struct UpdateEmitter {
    sink: mpsc::Sender<TaskStatus>,
}

impl UpdateEmitter {
    pub fn new(sink: mpsc::Sender<TaskStatus>) -> Self {
        Self { sink }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    pub async fn emit(&self, code: StateCode, text: impl Into<String>) {
        let _ = self.sink.send(TaskStatus::new(code, text)).await;
    }

    /// Free-form progress text without a state transition.
    pub async fn notify(&self, text: impl Into<String>) {
        self.emit(StateCode::Notify, text).await;
    }

    /// Line accumulated into the end-of-run summary on the client.
    pub async fn summary(&self, text: impl Into<String>) {
        self.emit(StateCode::PushSummary, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        let status = TaskStatus::new(StateCode::FetchIp, "Resolved a.example.com");
        let serialized = serde_json::to_string(&status).unwrap();
        assert!(serialized.contains("\"fetchip\""));
        let parsed: TaskStatus = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed.state_code, StateCode::FetchIp);
        assert_eq!(parsed.op_desc, "Fetching IP Addresses of hosts");
    }

    #[test]
    fn free_form_states_have_no_description() {
        assert_eq!(StateCode::Notify.describe(), "");
        assert_eq!(StateCode::PushSummary.describe(), "");
        assert_eq!(StateCode::Swap.describe(), "");
    }

    #[tokio::test]
    async fn emitter_ignores_closed_sink() {
        let (tx, rx) = mpsc::channel(1);
        let emitter = UpdateEmitter::new(tx);
        drop(rx);
        assert!(emitter.is_closed());
        // Must not panic or block.
        emitter.notify("nobody listening").await;
    }
}
