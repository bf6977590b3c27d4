//! In-memory task <-> group index.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{GroupId, TaskId, TaskIndexError};
use crate::ports::TaskToGroup;

#[derive(Default)]
struct Index {
    by_task: HashMap<TaskId, GroupId>,
    by_group: HashMap<GroupId, TaskId>,
}

/// Both directions live under one lock so a reader never sees half an entry.
#[derive(Default)]
pub struct InMemoryTaskToGroup {
    index: RwLock<Index>,
}

impl InMemoryTaskToGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.by_task.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskToGroup for InMemoryTaskToGroup {
    async fn save(&self, task: &TaskId, group: &GroupId) -> Result<(), TaskIndexError> {
        let mut index = self.index.write().await;
        match index.by_task.get(task) {
            Some(existing) if existing == group => return Ok(()),
            Some(existing) => {
                return Err(TaskIndexError::AlreadyBound {
                    task: task.clone(),
                    group: existing.clone(),
                });
            }
            None => {}
        }
        index.by_task.insert(task.clone(), group.clone());
        index.by_group.insert(group.clone(), task.clone());
        Ok(())
    }

    async fn group_by_task(&self, task: &TaskId) -> Result<GroupId, TaskIndexError> {
        self.index
            .read()
            .await
            .by_task
            .get(task)
            .cloned()
            .ok_or_else(|| TaskIndexError::GroupNotFound(task.clone()))
    }

    async fn task_by_group(&self, group: &GroupId) -> Result<TaskId, TaskIndexError> {
        self.index
            .read()
            .await
            .by_group
            .get(group)
            .cloned()
            .ok_or_else(|| TaskIndexError::TaskNotFound(group.clone()))
    }

    async fn delete(&self, task: &TaskId) -> Result<(), TaskIndexError> {
        let mut index = self.index.write().await;
        if let Some(group) = index.by_task.remove(task) {
            index.by_group.remove(&group);
        }
        Ok(())
    }
}
