//! In-memory resource store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Resource, ResourceId, ResourceStatus, ResourceStoreError};
use crate::ports::ResourceStore;

#[derive(Default)]
pub struct InMemoryResourceStore {
    resources: RwLock<HashMap<ResourceId, Resource>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, resource: Resource) {
        self.resources
            .write()
            .await
            .insert(resource.id.clone(), resource);
    }

    /// Change only the status, creating the resource if needed.
    pub async fn set_status(&self, id: &ResourceId, status: ResourceStatus) {
        let mut resources = self.resources.write().await;
        resources
            .entry(id.clone())
            .or_insert_with(|| Resource::missing(id.clone()))
            .status = status;
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn load(&self, ids: &[ResourceId]) -> Result<Vec<Resource>, ResourceStoreError> {
        let resources = self.resources.read().await;
        Ok(ids
            .iter()
            .map(|id| {
                resources
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Resource::missing(id.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_resources_do_not_exist() {
        let store = InMemoryResourceStore::new();
        store
            .set_status(&ResourceId::new("r1"), ResourceStatus::Ready)
            .await;

        let loaded = store
            .load(&[ResourceId::new("r1"), ResourceId::new("r2")])
            .await
            .unwrap();
        assert_eq!(loaded[0].status, ResourceStatus::Ready);
        assert_eq!(loaded[1].status, ResourceStatus::DoesNotExist);
        assert_eq!(loaded[1].id, ResourceId::new("r2"));
    }
}
