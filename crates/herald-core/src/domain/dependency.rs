//! Dependencies and dependency groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{DependencyId, GroupId};

/// Dependency status.
///
/// State transitions:
/// - Pending -> Ok
/// - Pending -> Failed
///
/// Terminal values never change again. Resolving a terminal dependency is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Pending,
    Ok,
    Failed,
}

impl DependencyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DependencyStatus::Ok | DependencyStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DependencyStatus::Pending => "pending",
            DependencyStatus::Ok => "ok",
            DependencyStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DependencyStatus::Pending),
            "ok" => Ok(DependencyStatus::Ok),
            "failed" => Ok(DependencyStatus::Failed),
            other => Err(format!("unknown dependency status '{other}'")),
        }
    }
}

/// A single prerequisite of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: DependencyId,
    pub status: DependencyStatus,
}

impl Dependency {
    pub fn pending(id: DependencyId) -> Self {
        Self {
            id,
            status: DependencyStatus::Pending,
        }
    }

    pub fn ok(id: DependencyId) -> Self {
        Self {
            id,
            status: DependencyStatus::Ok,
        }
    }

    pub fn failed(id: DependencyId) -> Self {
        Self {
            id,
            status: DependencyStatus::Failed,
        }
    }
}

/// A prerequisite as declared by the task producer.
///
/// `name` selects the resolver, `data` is resolver specific
/// (the resource resolver expects a resource id string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DependencySpec {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Convenience constructor for `{ name: "resource", data: <resource id> }`.
    pub fn resource(resource_id: impl Into<String>) -> Self {
        Self::new("resource", serde_json::Value::String(resource_id.into()))
    }
}

/// Group status.
///
/// State transitions:
/// - Created -> Initializing -> Waiting -> Claimed
///
/// `Initializing` only exists inside `initialize_group`; backends that run the
/// whole initialization in one critical section never expose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Created,
    Initializing,
    Waiting,
    Claimed,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Created => "created",
            GroupStatus::Initializing => "initializing",
            GroupStatus::Waiting => "waiting",
            GroupStatus::Claimed => "claimed",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(GroupStatus::Created),
            "initializing" => Ok(GroupStatus::Initializing),
            "waiting" => Ok(GroupStatus::Waiting),
            "claimed" => Ok(GroupStatus::Claimed),
            other => Err(format!("unknown group status '{other}'")),
        }
    }
}

/// Snapshot of a group as returned by `load_groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub status: GroupStatus,

    /// Members still `Pending`, maintained by the store.
    pub pending: u32,

    pub dependencies: Vec<Dependency>,
}

impl Group {
    /// Would the ready poller claim this group?
    pub fn is_claimable(&self) -> bool {
        self.status == GroupStatus::Waiting && self.pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DependencyStatus::Pending, false)]
    #[case(DependencyStatus::Ok, true)]
    #[case(DependencyStatus::Failed, true)]
    fn terminal_statuses(#[case] status: DependencyStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[rstest]
    #[case(GroupStatus::Created)]
    #[case(GroupStatus::Initializing)]
    #[case(GroupStatus::Waiting)]
    #[case(GroupStatus::Claimed)]
    fn group_status_parses_its_own_name(#[case] status: GroupStatus) {
        assert_eq!(status.as_str().parse::<GroupStatus>(), Ok(status));
    }

    #[rstest]
    #[case(GroupStatus::Created, 0, false)]
    #[case(GroupStatus::Waiting, 2, false)]
    #[case(GroupStatus::Waiting, 0, true)]
    #[case(GroupStatus::Claimed, 0, false)]
    fn claimable_means_waiting_at_zero(
        #[case] status: GroupStatus,
        #[case] pending: u32,
        #[case] claimable: bool,
    ) {
        let group = Group {
            id: GroupId::new("g1"),
            status,
            pending,
            dependencies: Vec::new(),
        };
        assert_eq!(group.is_claimable(), claimable);
    }

    #[test]
    fn spec_without_data_defaults_to_null() {
        let spec: DependencySpec = serde_json::from_str(r#"{ "name": "resource" }"#).unwrap();
        assert_eq!(spec.name, "resource");
        assert!(spec.data.is_null());
    }

    #[test]
    fn resource_spec_carries_resource_id() {
        let spec = DependencySpec::resource("res-42");
        assert_eq!(spec.name, "resource");
        assert_eq!(spec.data, serde_json::json!("res-42"));
    }
}
