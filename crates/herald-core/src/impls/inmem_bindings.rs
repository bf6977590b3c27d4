//! In-memory binding store for the resource resolver.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{DependencyId, ResolverError, ResourceId};
use crate::ports::{Binding, BindingStatus, BindingStore};

#[derive(Default)]
pub struct InMemoryBindingStore {
    bindings: Mutex<HashMap<DependencyId, Binding>>,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, dependency: &DependencyId) -> Option<Binding> {
        self.bindings.lock().await.get(dependency).cloned()
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn save(
        &self,
        dependency: &DependencyId,
        resource: &ResourceId,
        now: DateTime<Utc>,
    ) -> Result<(), ResolverError> {
        self.bindings.lock().await.insert(
            dependency.clone(),
            Binding {
                dependency_id: dependency.clone(),
                resource_id: resource.clone(),
                status: BindingStatus::Pending,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn poll(
        &self,
        limit: usize,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Binding>, ResolverError> {
        let bindings = self.bindings.lock().await;
        let mut due: Vec<Binding> = bindings
            .values()
            .filter(|b| b.status == BindingStatus::Pending)
            .filter(|b| updated_after.is_none_or(|after| b.updated_at >= after))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.dependency_id.cmp(&b.dependency_id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn resolve(
        &self,
        dependencies: &[DependencyId],
        now: DateTime<Utc>,
    ) -> Result<(), ResolverError> {
        let mut bindings = self.bindings.lock().await;
        for id in dependencies {
            if let Some(binding) = bindings.get_mut(id) {
                if binding.status != BindingStatus::Resolved {
                    binding.status = BindingStatus::Resolved;
                    binding.updated_at = now;
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, dependency: &DependencyId) -> Result<(), ResolverError> {
        self.bindings.lock().await.remove(dependency);
        Ok(())
    }
}
