//! In-memory task store (tests and the demo binary).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DependencyId, GroupId, TaskId, TaskRecord, TaskStoreError};
use crate::ports::TaskStore;

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task record.
    pub async fn insert(&self, task: TaskRecord) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.read().await.get(id).cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn load(&self, task: &TaskId) -> Result<TaskRecord, TaskStoreError> {
        self.get(task)
            .await
            .ok_or_else(|| TaskStoreError::NotFound(task.clone()))
    }

    async fn update_dependencies(
        &self,
        task: &TaskId,
        group: &GroupId,
        instances: &[DependencyId],
    ) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let record = tasks
            .get_mut(task)
            .ok_or_else(|| TaskStoreError::NotFound(task.clone()))?;
        record.dependencies.group_id = Some(group.clone());
        record.dependencies.instances = instances.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencySpec;

    #[tokio::test]
    async fn update_dependencies_keeps_specs() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new("t1");
        store
            .insert(TaskRecord::new(id.clone(), vec![DependencySpec::resource("r1")]))
            .await;

        store
            .update_dependencies(&id, &GroupId::new("g1"), &[DependencyId::new("d1")])
            .await
            .unwrap();

        let task = store.load(&id).await.unwrap();
        assert_eq!(task.dependencies.specs.len(), 1);
        assert_eq!(task.dependencies.group_id, Some(GroupId::new("g1")));
        assert_eq!(task.dependencies.instances, vec![DependencyId::new("d1")]);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = InMemoryTaskStore::new();
        let err = store.load(&TaskId::new("nope")).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::NotFound(_)));
    }
}
