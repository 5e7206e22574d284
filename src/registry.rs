//! Services registered on a listener, keyed by upgrade path.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

use crate::service::{WebSocketService, sanitize_base_path};

/// Errors raised while registering services.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// Another service already owns the path.
    #[error("a service is already registered at {0}")]
    DuplicatePath(String),
}

/// Registry resolving upgrade paths to services.
///
/// Matching is an exact comparison of sanitised paths; the query string of
/// the request target is ignored.
#[derive(Default)]
pub struct ServiceRegistry(DashMap<String, Arc<WebSocketService>>);

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `service` under its base path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePath`] if the path is taken.
    pub fn register(&self, service: WebSocketService) -> Result<Arc<WebSocketService>, RegistryError> {
        match self.0.entry(service.base_path().to_owned()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicatePath(entry.key().clone())),
            Entry::Vacant(slot) => {
                let service = Arc::new(service);
                tracing::debug!(path = %service.base_path(), name = %service.name(), "service registered");
                slot.insert(Arc::clone(&service));
                Ok(service)
            }
        }
    }

    /// Find the service for an upgrade request target.
    #[must_use]
    pub fn resolve(&self, target: &str) -> Option<Arc<WebSocketService>> {
        let path = target.split_once('?').map_or(target, |(path, _)| path);
        self.0
            .get(&sanitize_base_path(path))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the service registered at `path`.
    pub fn deregister(&self, path: &str) -> Option<Arc<WebSocketService>> {
        self.0.remove(&sanitize_base_path(path)).map(|(_, service)| service)
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Largest frame size accepted by any registered service.
    ///
    /// `None` when no service is registered.
    #[must_use]
    pub fn largest_frame_size(&self) -> Option<usize> {
        self.0.iter().map(|entry| entry.value().max_frame_size()).max()
    }

        /// Registered paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.0.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn registry() -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        registry
            .register(WebSocketService::builder("chat").path("/chat").build())
            .expect("register chat");
        registry
    }

    #[rstest]
    #[case("/chat")]
    #[case("/chat/")]
    #[case(" chat ")]
    #[case("/chat?room=1")]
    fn resolves_sanitized_targets(registry: ServiceRegistry, #[case] target: &str) {
        let service = registry.resolve(target).expect("service resolves");
        assert_eq!(service.name(), "chat");
    }

    #[rstest]
    #[case("/chat/room")]
    #[case("/cha")]
    #[case("/")]
    fn no_prefix_matching(registry: ServiceRegistry, #[case] target: &str) {
        assert!(registry.resolve(target).is_none());
    }

    #[rstest]
    fn duplicate_path_rejected(registry: ServiceRegistry) {
        let err = registry
            .register(WebSocketService::builder("other").path("chat/").build())
            .expect_err("duplicate path");
        assert_eq!(err, RegistryError::DuplicatePath("/chat".into()));
    }

    #[rstest]
    fn deregister_removes_service(registry: ServiceRegistry) {
        assert!(registry.deregister("/chat").is_some());
        assert!(registry.resolve("/chat").is_none());
        assert!(registry.is_empty());
    }

    #[rstest]
    fn largest_frame_size_spans_services(registry: ServiceRegistry) {
        assert_eq!(registry.largest_frame_size(), Some(65_536));
        registry
            .register(WebSocketService::builder("bulk").max_frame_size(1 << 20).build())
            .expect("register bulk");
        assert_eq!(registry.largest_frame_size(), Some(1 << 20));
        assert_eq!(ServiceRegistry::new().largest_frame_size(), None);
    }

    #[rstest]
    fn paths_are_sorted(registry: ServiceRegistry) {
        registry
            .register(WebSocketService::builder("admin").build())
            .expect("register admin");
        assert_eq!(registry.paths(), vec!["/admin".to_owned(), "/chat".to_owned()]);
        assert_eq!(registry.len(), 2);
    }
}
