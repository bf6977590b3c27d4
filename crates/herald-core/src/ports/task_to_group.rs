//! TaskToGroup port - タスクと依存グループの 1:1 対応

use async_trait::async_trait;

use crate::domain::{GroupId, TaskId, TaskIndexError};

/// Bidirectional task <-> group lookup.
///
/// Written once per registration, read by the ready collector.
#[async_trait]
pub trait TaskToGroup: Send + Sync {
    async fn save(&self, task: &TaskId, group: &GroupId) -> Result<(), TaskIndexError>;

    async fn group_by_task(&self, task: &TaskId) -> Result<GroupId, TaskIndexError>;

    async fn task_by_group(&self, group: &GroupId) -> Result<TaskId, TaskIndexError>;

    /// Registration compensation. Missing entries are ignored.
    async fn delete(&self, task: &TaskId) -> Result<(), TaskIndexError>;
}
