//! Server-side orchestration: step implementations over the store and
//! adapters, the per-call task runner, the streaming task service, the
//! auto-update reconciliation loop, and the line-framed network front.

pub mod autoupdater;
pub mod core;
pub mod net;
pub mod runner;
pub mod service;

pub use autoupdater::AutoUpdater;
pub use self::core::ServerCore;
pub use service::{TaskOperation, TaskRequest};
