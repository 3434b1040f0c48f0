//! DNS adapter contract and record model.

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// A-record-only view of a DNS entry; enough for host routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub domain: String,
    pub rtype: String,
    pub addr: IpAddr,
    pub ttl: u32,
}

impl DnsRecord {
    pub fn a(domain: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            domain: domain.into(),
            rtype: "A".to_string(),
            addr,
            ttl: 0,
        }
    }
}

/// Capability interface over a concrete DNS backend. Some setups batch
/// changes, hence the explicit commit.
#[async_trait]
pub trait DnsAdapter: Send + Sync {
    async fn authenticate(&mut self, config: &HashMap<String, String>) -> Result<(), AdapterError>;

    /// All records of the given type currently present on the backend.
    async fn get_records(&self, rtype: &str) -> Result<Vec<DnsRecord>, AdapterError>;

    async fn add_record(&self, record: DnsRecord) -> Result<(), AdapterError>;

    async fn del_record(&self, record: &DnsRecord) -> Result<(), AdapterError>;

    async fn commit_records(&self) -> Result<(), AdapterError>;
}

/// No-op DNS adapter. Usable as a skeleton for new backends and for dry runs.
pub struct NullDns;

#[async_trait]
impl DnsAdapter for NullDns {
    async fn authenticate(&mut self, _config: &HashMap<String, String>) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_records(&self, _rtype: &str) -> Result<Vec<DnsRecord>, AdapterError> {
        Ok(Vec::new())
    }

    async fn add_record(&self, _record: DnsRecord) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn del_record(&self, _record: &DnsRecord) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn commit_records(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
