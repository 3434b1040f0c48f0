//! AutoVPN: Declarative Network Configuration Orchestration
//!
//! Applies and retracts declarative playbooks (hosts, DNS backend, routing
//! backend, egress interface) against pluggable network devices, driven over a
//! streaming task API and persisted so operations survive restarts.

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod playbook;
pub mod resolve;
pub mod server;
pub mod store;
pub mod task;
