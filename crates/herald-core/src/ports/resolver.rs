//! Resolver port - 依存関係を外部条件に結びつける
//!
//! A resolver is selected by `DependencySpec::name`. It persists a binding
//! between a dependency and whatever condition the dependency's `data` describes,
//! and reports dependencies whose condition became true.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{DependencyId, ResolverError};

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Persist the association. Must be safe before the owning group is initialized.
    async fn bind(&self, dependency: &DependencyId, data: &serde_json::Value)
    -> Result<(), ResolverError>;

    /// Undo `bind` (registration compensation). Unknown ids are ignored.
    async fn unbind(&self, dependency: &DependencyId) -> Result<(), ResolverError>;

    /// Start reporting satisfied dependencies.
    ///
    /// The stream ends when `cancel` fires. Duplicates are allowed, the store
    /// resolves idempotently.
    fn ready(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<DependencyId>, ResolverError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("resolver '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Registry of resolvers (resolver name -> resolver).
///
/// Built during initialization (mutable), used during runtime (immutable).
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.resolvers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.resolvers.insert(name, resolver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolvers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Resolver>)> {
        self.resolvers.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopResolver;

    #[async_trait]
    impl Resolver for NoopResolver {
        async fn bind(
            &self,
            _dependency: &DependencyId,
            _data: &serde_json::Value,
        ) -> Result<(), ResolverError> {
            Ok(())
        }

        async fn unbind(&self, _dependency: &DependencyId) -> Result<(), ResolverError> {
            Ok(())
        }

        fn ready(
            &self,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<DependencyId>, ResolverError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ResolverRegistry::new();
        registry.register("noop", Arc::new(NoopResolver)).unwrap();

        assert!(registry.get("noop").is_some());
        assert!(registry.get("resource").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = ResolverRegistry::new();
        registry.register("noop", Arc::new(NoopResolver)).unwrap();
        let result = registry.register("noop", Arc::new(NoopResolver));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(name)) if name == "noop"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ResolverRegistry::new();
        registry.register("b", Arc::new(NoopResolver)).unwrap();
        registry.register("a", Arc::new(NoopResolver)).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
