//! TaskStore port - タスクレコードの正本（外部）
//!
//! The scheduler reads a task's dependency specs and writes back the group
//! id and dependency ids for observability. Nothing here is needed for
//! correctness of readiness detection.

use async_trait::async_trait;

use crate::domain::{DependencyId, GroupId, TaskId, TaskRecord, TaskStoreError};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load(&self, task: &TaskId) -> Result<TaskRecord, TaskStoreError>;

    async fn update_dependencies(
        &self,
        task: &TaskId,
        group: &GroupId,
        instances: &[DependencyId],
    ) -> Result<(), TaskStoreError>;
}
