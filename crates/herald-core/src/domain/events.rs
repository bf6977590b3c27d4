//! Events - タスクライフサイクルイベント
//!
//! The bus carries opaque bytes; for both task topics the payload is the
//! task id encoded as UTF-8.

use super::ids::TaskId;

/// Topic a newly spawned task is announced on.
pub const TASK_CREATED: &str = "task:created";

/// Topic the scheduler announces ready tasks on.
pub const TASK_READY: &str = "task:ready";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: String,
    pub data: Vec<u8>,
}

impl Event {
    pub fn new(topic: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            data: data.into(),
        }
    }

    pub fn task_created(task_id: &TaskId) -> Self {
        Self::new(TASK_CREATED, task_id.as_str().as_bytes())
    }

    pub fn task_ready(task_id: &TaskId) -> Self {
        Self::new(TASK_READY, task_id.as_str().as_bytes())
    }

    /// Decode the payload of a task lifecycle event.
    pub fn task_id(&self) -> Result<TaskId, std::str::Utf8Error> {
        std::str::from_utf8(&self.data).map(TaskId::new)
    }
}
