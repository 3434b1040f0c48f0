//! Drives a built Executor to completion, forwarding status updates to the
//! caller's channel.

use crate::server::core::ServerCore;
use crate::task::{Executor, TaskStatus, TickError, UpdateEmitter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Tick the executor until it finishes, fails, or the caller disconnects.
/// A disconnect is checked between ticks only; an in-flight step always runs
/// to completion so the playbook is never left half-applied.
pub async fn run_task(
    core: Arc<ServerCore>,
    mut executor: Executor,
    sink: mpsc::Sender<TaskStatus>,
) {
    let emitter = UpdateEmitter::new(sink);
    executor.start(emitter.clone());
    loop {
        if emitter.is_closed() {
            debug!("caller disconnected, abandoning task stream");
            break;
        }
        match executor.tick().await {
            Ok(()) => {}
            Err(TickError::Finished) | Err(TickError::NotStarted) | Err(TickError::Fatal(_)) => {
                break;
            }
        }
        if executor.last_error().is_some() {
            break;
        }
    }
    core.update_updater_table();
}
