//! Line-delimited JSON transport for the task API.
//!
//! Each connection carries exactly one request: the client sends a
//! `TaskRequest` as a single JSON line and reads `TaskStatus` JSON lines
//! until the server closes the stream.

use crate::server::core::ServerCore;
use crate::server::service::TaskRequest;
use crate::task::{StateCode, TaskStatus};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Accept loop. Runs until the listener fails or the surrounding task is
/// cancelled; one connection's failure never takes the server down.
pub async fn serve(core: Arc<ServerCore>, listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener
            .accept()
            .await
            .context("failed accepting connection")?;
        let core = core.clone();
        tokio::spawn(async move {
            info!(%peer, "connection accepted");
            if let Err(err) = handle_connection(core, socket).await {
                warn!(%peer, "connection failed: {:#}", err);
            }
        });
    }
}

async fn handle_connection(core: Arc<ServerCore>, socket: TcpStream) -> anyhow::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    let Some(line) = lines.next_line().await.context("failed reading request")? else {
        return Ok(());
    };
    let request: TaskRequest = match serde_json::from_str(&line) {
        Ok(request) => request,
        Err(err) => {
            let status = TaskStatus::new(StateCode::Error, format!("Malformed request: {}", err));
            write_status(&mut writer, &status).await?;
            return Ok(());
        }
    };

    let mut updates = core.execute_task(request);
    while let Some(status) = updates.recv().await {
        // Client hangup drops the receiver, which the runner observes.
        write_status(&mut writer, &status).await?;
    }
    Ok(())
}

async fn write_status(
    writer: &mut (impl AsyncWriteExt + Unpin),
    status: &TaskStatus,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(status).context("failed encoding status")?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("failed writing status")?;
    Ok(())
}
