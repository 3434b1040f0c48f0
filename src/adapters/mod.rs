//! Adapter capability interfaces and the kind-name registry.
//!
//! Concrete device protocols live behind the `DnsAdapter` and `RouteAdapter`
//! traits; the core only ever selects them by the kind name written in a
//! playbook. An unknown kind is a fatal construction error, never a silent
//! no-op — the `null` adapters stay available for dry runs, but only when
//! asked for by name.

pub mod dns;
pub mod routes;

pub use dns::{DnsAdapter, DnsRecord, NullDns};
pub use routes::{NullRoutes, Route, RouteAdapter};

use crate::error::AdapterError;
use std::collections::HashMap;

pub type DnsFactory = Box<dyn Fn() -> Box<dyn DnsAdapter> + Send + Sync>;
pub type RouteFactory = Box<dyn Fn() -> Box<dyn RouteAdapter> + Send + Sync>;

/// Name -> constructor registry populated at startup. Lookups are
/// case-insensitive to match how kinds are written in playbooks.
#[derive(Default)]
pub struct AdapterRegistry {
    dns: HashMap<String, DnsFactory>,
    routes: HashMap<String, RouteFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in no-op adapters under the `null` kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_dns("null", || Box::new(NullDns));
        registry.register_routes("null", || Box::new(NullRoutes));
        registry
    }

    pub fn register_dns<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Box<dyn DnsAdapter> + Send + Sync + 'static,
    {
        self.dns.insert(kind.to_lowercase(), Box::new(factory));
    }

    pub fn register_routes<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Box<dyn RouteAdapter> + Send + Sync + 'static,
    {
        self.routes.insert(kind.to_lowercase(), Box::new(factory));
    }

    pub fn dns(&self, kind: &str) -> Result<Box<dyn DnsAdapter>, AdapterError> {
        self.dns
            .get(&kind.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| AdapterError::UnknownKind(kind.to_string()))
    }

    pub fn routes(&self, kind: &str) -> Result<Box<dyn RouteAdapter>, AdapterError> {
        self.routes
            .get(&kind.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| AdapterError::UnknownKind(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_case_insensitively() {
        let registry = AdapterRegistry::with_builtins();
        assert!(registry.dns("null").is_ok());
        assert!(registry.dns("Null").is_ok());
        assert!(registry.routes("NULL").is_ok());
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = AdapterRegistry::with_builtins();
        match registry.dns("keenetic") {
            Err(AdapterError::UnknownKind(kind)) => assert_eq!(kind, "keenetic"),
            other => panic!("expected UnknownKind, got {:?}", other.map(|_| ())),
        }
        assert!(registry.routes("bogus").is_err());
    }
}
