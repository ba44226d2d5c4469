//! Service endpoint resolution.

use std::collections::HashMap;

use crate::error::{Result, SettlementError};

/// Logical name of the payment authority.
pub const PAYMENT_SERVICE: &str = "payment-service";

/// Logical name of the inventory authority.
pub const INVENTORY_SERVICE: &str = "inventory-service";

/// Maps a logical service name to a base URL.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, service: &str) -> Result<String>;
}

/// Resolver backed by a fixed table, usually built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointResolver {
    endpoints: HashMap<String, String>,
}

impl StaticEndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the base URL of a service. Trailing slashes are dropped.
    pub fn with_endpoint(mut self, service: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.endpoints.insert(service.into(), base_url);
        self
    }
}

impl EndpointResolver for StaticEndpointResolver {
    fn resolve(&self, service: &str) -> Result<String> {
        self.endpoints
            .get(service)
            .cloned()
            .ok_or_else(|| SettlementError::EndpointUnresolved(service.to_string()))
    }
}
