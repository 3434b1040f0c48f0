//! Playbook entity: the declarative description of hosts, DNS backend, route
//! backend and target interface that the server installs and uninstalls.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// DNS and route backend selection by registry kind name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterSelection {
    pub dns: String,
    pub routes: String,
}

/// Per-adapter string-keyed configuration (credentials, endpoints).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub dns: HashMap<String, String>,
    #[serde(default)]
    pub routes: HashMap<String, String>,
}

/// Persisted playbook record. `name` is the primary key; `busy`/`busy_reason`
/// form the exclusive per-playbook lock that survives restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub adapters: AdapterSelection,
    #[serde(default)]
    pub adapter_config: AdapterConfig,
    pub interface: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub custom: HashMap<String, String>,
    /// Auto-update interval in hours. Zero disables refresh tracking.
    #[serde(default)]
    pub auto_update_interval: i64,
    /// Unix seconds, stamped by the finalize step.
    #[serde(default)]
    pub install_time: i64,
    /// Resolved host -> address cache, kept for undo fallback and refresh.
    #[serde(default)]
    pub playbook_addrs: HashMap<String, String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub busy_reason: String,
}

impl Playbook {
    /// Parse a playbook from its YAML text form.
    pub fn parse(yaml: &str) -> Result<Self, TaskError> {
        let playbook: Playbook =
            serde_yaml::from_str(yaml).map_err(|e| TaskError::Parse(e.to_string()))?;
        if playbook.name.is_empty() {
            return Err(TaskError::Parse("playbook has no name".to_string()));
        }
        Ok(playbook)
    }

    /// Try to take the exclusive lock. Returns false if already held; the
    /// existing reason is preserved so callers can surface it.
    pub fn lock(&mut self, reason: &str) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        self.busy_reason = reason.to_string();
        true
    }

    pub fn unlock(&mut self) {
        self.busy = false;
        self.busy_reason.clear();
    }

    pub fn lock_reason(&self) -> &str {
        &self.busy_reason
    }
}
