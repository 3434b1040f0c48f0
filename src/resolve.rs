//! DNS-over-HTTPS resolution for playbook hosts.
//!
//! Resolution goes through the Cloudflare JSON API rather than the system
//! resolver, so the server routes hosts by their public addresses even when
//! its own DNS already points at the VPN.

use crate::error::ResolveError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

const DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";
const DOH_TIMEOUT: Duration = Duration::from_secs(10);

/// A-record resolution seam. The server holds this as a trait object so task
/// flows can be exercised without network access.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve the host's A record. `Ok(None)` means the name exists but has
    /// no usable answer.
    async fn resolve_a(&self, host: &str) -> Result<Option<String>, ResolveError>;
}

/// Resolver answering from a fixed host table. Unknown hosts resolve to
/// `None`.
#[derive(Default)]
pub struct StaticResolver {
    table: std::collections::HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(table: std::collections::HashMap<String, String>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve_a(&self, host: &str) -> Result<Option<String>, ResolveError> {
        Ok(self.table.get(host).cloned())
    }
}

/// Resolver backed by DNS-over-HTTPS.
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

impl DohResolver {
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_endpoint(DOH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(DOH_TIMEOUT)
            .build()
            .map_err(|e| ResolveError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Resolver for DohResolver {
    async fn resolve_a(&self, host: &str) -> Result<Option<String>, ResolveError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", host), ("type", "A")])
            .header("accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| ResolveError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ResolveError::Request(format!(
                "DoH query for {} returned status {}",
                host,
                response.status()
            )));
        }
        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        Ok(a_answer(&body))
    }
}

/// Last A answer wins, matching how round-robin responses were handled before.
fn a_answer(response: &DohResponse) -> Option<String> {
    response
        .answer
        .iter()
        .filter(|a| a.rtype == 1)
        .last()
        .map(|a| a.data.clone())
}

/// Hosts that are already IPv4 literals skip resolution; they are keyed by
/// their generated reverse-DNS name so the DNS apply step can tell them apart.
pub fn arpa_name(addr: Ipv4Addr) -> String {
    let octets = addr.octets();
    format!(
        "{}.{}.{}.{}.in-addr.arpa",
        octets[3], octets[2], octets[1], octets[0]
    )
}
