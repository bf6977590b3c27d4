//! In-memory counting dependency store.
//!
//! Each operation runs inside one critical section, which plays the role of
//! the transaction in the SQL backend. The algorithm is the same: a group
//! keeps a pending counter that is set once at initialization and only
//! decremented when a dependency actually leaves `Pending`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Dependency, DependencyId, DependencyStatus, Group, GroupId, GroupStatus, StoreError,
};
use crate::ports::{DependencyStore, IdGenerator, SystemClock, UlidGenerator};

#[derive(Debug, Clone)]
struct GroupRow {
    status: GroupStatus,
    pending: u32,
    members: Vec<DependencyId>,
}

struct InMemoryDependencyState {
    /// dependencies table
    dependencies: HashMap<DependencyId, DependencyStatus>,

    /// groups table
    groups: HashMap<GroupId, GroupRow>,

    /// Reverse membership: dependency -> groups containing it.
    memberships: HashMap<DependencyId, Vec<GroupId>>,

    /// Waiting groups whose counter reached zero, ordered so claims are
    /// oldest first. Groups still waiting on something are not in here.
    claimable: BTreeSet<GroupId>,
}

/// Narrow a member count to the group's counter.
fn pending_counter(group: &GroupId, pending: usize) -> Result<u32, StoreError> {
    u32::try_from(pending).map_err(|_| StoreError::TooManyDependencies(group.clone()))
}

impl InMemoryDependencyState {
    fn new() -> Self {
        Self {
            dependencies: HashMap::new(),
            groups: HashMap::new(),
            memberships: HashMap::new(),
            claimable: BTreeSet::new(),
        }
    }

    fn initialize_group(
        &mut self,
        group: &GroupId,
        dependencies: &[DependencyId],
    ) -> Result<(), StoreError> {
        let status = self
            .groups
            .get(group)
            .map(|row| row.status)
            .ok_or_else(|| StoreError::GroupNotFound(group.clone()))?;
        if status != GroupStatus::Created {
            return Err(StoreError::AlreadyInitialized(group.clone()));
        }

        // Validate everything before touching any row.
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(dependencies.len());
        for id in dependencies {
            if !self.dependencies.contains_key(id) {
                return Err(StoreError::UnknownDependency(id.clone()));
            }
            if seen.insert(id.clone()) {
                members.push(id.clone());
            }
        }

        let pending = pending_counter(
            group,
            members
                .iter()
                .filter(|id| self.dependencies.get(*id) == Some(&DependencyStatus::Pending))
                .count(),
        )?;

        for id in &members {
            self.memberships
                .entry(id.clone())
                .or_default()
                .push(group.clone());
        }

        if let Some(row) = self.groups.get_mut(group) {
            row.members = members;
            row.pending = pending;
            row.status = GroupStatus::Waiting;
        }
        if pending == 0 {
            self.claimable.insert(group.clone());
        }
        Ok(())
    }

    fn resolve(&mut self, values: &[Dependency]) {
        for value in values {
            if !value.status.is_terminal() {
                continue;
            }
            let Some(status) = self.dependencies.get_mut(&value.id) else {
                continue;
            };
            if status.is_terminal() {
                continue;
            }
            *status = value.status;

            let Some(groups) = self.memberships.get(&value.id) else {
                continue;
            };
            for group in groups {
                let Some(row) = self.groups.get_mut(group) else {
                    continue;
                };
                row.pending = row.pending.saturating_sub(1);
                if row.pending == 0 && row.status == GroupStatus::Waiting {
                    self.claimable.insert(group.clone());
                }
            }
        }
    }

    fn claim_ready_groups(&mut self, limit: usize) -> Vec<GroupId> {
        let mut claimed = Vec::with_capacity(limit.min(self.claimable.len()));
        while claimed.len() < limit {
            let Some(id) = self.claimable.pop_first() else {
                break;
            };
            if let Some(row) = self.groups.get_mut(&id) {
                row.status = GroupStatus::Claimed;
            }
            claimed.push(id);
        }
        claimed
    }

    fn snapshot(&self, id: &GroupId, row: &GroupRow) -> Group {
        let dependencies = row
            .members
            .iter()
            .filter_map(|dep| {
                self.dependencies.get(dep).map(|status| Dependency {
                    id: dep.clone(),
                    status: *status,
                })
            })
            .collect();
        Group {
            id: id.clone(),
            status: row.status,
            pending: row.pending,
            dependencies,
        }
    }
}

/// In-memory dependency store (single process, tests and the demo binary).
pub struct InMemoryDependencyStore {
    state: Arc<Mutex<InMemoryDependencyState>>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryDependencyStore {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryDependencyState::new())),
            ids,
        }
    }
}

impl Default for InMemoryDependencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DependencyStore for InMemoryDependencyStore {
    async fn new_dependencies(&self, n: usize) -> Result<Vec<Dependency>, StoreError> {
        let created: Vec<Dependency> = (0..n)
            .map(|_| Dependency::pending(self.ids.generate_dependency_id()))
            .collect();

        let mut state = self.state.lock().await;
        for dep in &created {
            state.dependencies.insert(dep.id.clone(), dep.status);
        }
        Ok(created)
    }

    async fn new_group(&self) -> Result<GroupId, StoreError> {
        let id = self.ids.generate_group_id();
        let mut state = self.state.lock().await;
        state.groups.insert(
            id.clone(),
            GroupRow {
                status: GroupStatus::Created,
                pending: 0,
                members: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn initialize_group(
        &self,
        group: &GroupId,
        dependencies: &[DependencyId],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.initialize_group(group, dependencies)
    }

    async fn resolve(&self, values: &[Dependency]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.resolve(values);
        Ok(())
    }

    async fn claim_ready_groups(&self, limit: usize) -> Result<Vec<GroupId>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.claim_ready_groups(limit))
    }

    async fn load_dependencies(&self, ids: &[DependencyId]) -> Result<Vec<Dependency>, StoreError> {
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| {
                state.dependencies.get(id).map(|status| Dependency {
                    id: id.clone(),
                    status: *status,
                })
            })
            .collect())
    }

    async fn load_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, StoreError> {
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| state.groups.get(id).map(|row| state.snapshot(id, row)))
            .collect())
    }

    async fn discard_dependencies(&self, ids: &[DependencyId]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for id in ids {
            let referenced = state
                .memberships
                .get(id)
                .is_some_and(|groups| !groups.is_empty());
            if !referenced && state.dependencies.get(id) == Some(&DependencyStatus::Pending) {
                state.dependencies.remove(id);
            }
        }
        Ok(())
    }

    async fn discard_group(&self, group: &GroupId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let created = state
            .groups
            .get(group)
            .is_some_and(|row| row.status == GroupStatus::Created);
        if created {
            state.groups.remove(group);
        }
        Ok(())
    }
}
