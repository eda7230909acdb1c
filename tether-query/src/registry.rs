//! Explicit endpoint registry.
//!
//! Associations resolve their target endpoint lazily by alias. Rather
//! than a process-wide static, the registry is an explicit value shared
//! by `Arc` with whatever constructs associations and queries, with
//! explicit get-or-create and clear operations.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::traits::Endpoint;

/// A registry of endpoints, keyed by alias.
#[derive(Default)]
pub struct EndpointRegistry {
    entries: RwLock<IndexMap<String, Arc<dyn Endpoint>>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an endpoint by alias.
    pub fn get(&self, alias: &str) -> Option<Arc<dyn Endpoint>> {
        self.entries.read().get(alias).cloned()
    }

    /// Look up an endpoint, constructing and registering it if absent.
    pub fn get_or_create(
        &self,
        alias: &str,
        factory: impl FnOnce() -> Arc<dyn Endpoint>,
    ) -> Arc<dyn Endpoint> {
        if let Some(existing) = self.get(alias) {
            return existing;
        }
        let created = factory();
        self.entries
            .write()
            .entry(alias.to_string())
            .or_insert(created)
            .clone()
    }

    /// Register an endpoint under its own alias, replacing any existing
    /// registration.
    pub fn insert(&self, endpoint: Arc<dyn Endpoint>) {
        self.entries
            .write()
            .insert(endpoint.alias().to_string(), endpoint);
    }

    /// Remove an endpoint by alias.
    pub fn remove(&self, alias: &str) -> Option<Arc<dyn Endpoint>> {
        self.entries.write().shift_remove(alias)
    }

    /// Drop all registrations.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Aliases of all registered endpoints, in registration order.
    pub fn aliases(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("aliases", &self.aliases())
            .finish()
    }
}
