//! Playbook Store
//!
//! Key-value persistence of playbooks keyed by name. Lock state is persisted
//! on purpose: a crash mid-operation leaves the record locked and discoverable
//! rather than silently lost.

pub mod persistence;

pub use persistence::SledPlaybookStore;

use crate::error::StoreError;
use crate::playbook::Playbook;
use std::collections::HashMap;

/// Result of an atomic lock attempt performed by the store itself, so the lock
/// transition and its persistence cannot diverge across a crash.
#[derive(Debug)]
pub enum LockOutcome {
    /// Lock taken; the returned record carries the new busy state.
    Acquired(Playbook),
    /// Already locked; carries the stored reason.
    Busy(String),
    NotFound,
}

/// Playbook Store interface
pub trait PlaybookStore: Send + Sync {
    fn get_all(&self) -> Result<HashMap<String, Playbook>, StoreError>;

    fn get(&self, name: &str) -> Result<Option<Playbook>, StoreError>;

    /// Upsert by name, full-value overwrite including lock state.
    fn put(&self, playbook: &Playbook) -> Result<(), StoreError>;

    fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Atomic test-and-set of the busy lock for the named playbook.
    fn try_lock(&self, name: &str, reason: &str) -> Result<LockOutcome, StoreError>;
}
