//! Route adapter contract and route model.

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An IP route as the core needs it. The comment field carries the ownership
/// tag (`[AutoVPN2] Playbook: <name> Host: <host>`) that lets undo identify
/// which live routes belong to which playbook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub gateway: String,
    pub interface: String,
    pub comment: String,
}

/// Capability interface over a concrete router. Most devices don't persist
/// config changes immediately, hence the explicit save.
#[async_trait]
pub trait RouteAdapter: Send + Sync {
    async fn authenticate(&mut self, config: &HashMap<String, String>) -> Result<(), AdapterError>;

    /// The device's current routing table.
    async fn get_routes(&self) -> Result<Vec<Route>, AdapterError>;

    async fn add_route(&self, route: Route) -> Result<(), AdapterError>;

    async fn del_route(&self, route: &Route) -> Result<(), AdapterError>;

    async fn save_config(&self) -> Result<(), AdapterError>;
}

/// No-op route adapter for dry runs and as a skeleton for new devices.
pub struct NullRoutes;

#[async_trait]
impl RouteAdapter for NullRoutes {
    async fn authenticate(&mut self, _config: &HashMap<String, String>) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_routes(&self) -> Result<Vec<Route>, AdapterError> {
        Ok(Vec::new())
    }

    async fn add_route(&self, _route: Route) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn del_route(&self, _route: &Route) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn save_config(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
