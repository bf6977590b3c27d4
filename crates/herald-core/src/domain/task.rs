//! Task records as far as scheduling is concerned.

use serde::{Deserialize, Serialize};

use super::dependency::DependencySpec;
use super::ids::{DependencyId, GroupId, TaskId};

/// The `dependencies` section of a task's info.
///
/// `specs` are written by the producer; `group_id` and `instances` are filled
/// in by registration for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependenciesInfo {
    #[serde(default)]
    pub specs: Vec<DependencySpec>,

    #[serde(default)]
    pub group_id: Option<GroupId>,

    #[serde(default)]
    pub instances: Vec<DependencyId>,
}

/// Task record (only the parts the scheduler reads or writes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    #[serde(default)]
    pub dependencies: DependenciesInfo,
}

impl TaskRecord {
    pub fn new(id: TaskId, specs: Vec<DependencySpec>) -> Self {
        Self {
            id,
            dependencies: DependenciesInfo {
                specs,
                ..Default::default()
            },
        }
    }
}
