//! BindingStore port - resource resolver のバインディング保存先
//!
//! Layout: `(dependency_id, resource_id, status, updated_at)`.
//! This table belongs to the resource resolver, not to the dependency store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DependencyId, ResourceId, ResolverError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub dependency_id: DependencyId,
    pub resource_id: ResourceId,
    pub status: BindingStatus,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn save(
        &self,
        dependency: &DependencyId,
        resource: &ResourceId,
        now: DateTime<Utc>,
    ) -> Result<(), ResolverError>;

    /// Up to `limit` pending bindings, oldest first.
    ///
    /// With `updated_after` set, bindings last touched before it are skipped.
    async fn poll(
        &self,
        limit: usize,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Binding>, ResolverError>;

    /// Mark pending bindings as resolved.
    async fn resolve(
        &self,
        dependencies: &[DependencyId],
        now: DateTime<Utc>,
    ) -> Result<(), ResolverError>;

    async fn remove(&self, dependency: &DependencyId) -> Result<(), ResolverError>;
}
