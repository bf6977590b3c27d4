//! ResourceStore port - リソースの状態（外部）

use async_trait::async_trait;

use crate::domain::{Resource, ResourceId, ResourceStoreError};

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Batch load. Ids the store does not know come back as `DoesNotExist`.
    async fn load(&self, ids: &[ResourceId]) -> Result<Vec<Resource>, ResourceStoreError>;
}
