//! DependencyStore port - 依存関係とグループの正本
//!
//! Readiness is a counter, not a query: every group carries the number of
//! member dependencies that are still pending, and that counter is only ever
//! changed by the store inside the same atomic step that changes a
//! dependency's status. Callers never recompute it.
//!
//! Every backend must make these operations safe for arbitrary concurrent
//! callers on any number of replicas, without distributed locks:
//! - `initialize_group` counts pending members in the same step that publishes
//!   the membership, so dependencies resolved earlier are already excluded.
//! - `resolve` flips `pending -> terminal` conditionally and decrements only
//!   for rows it actually flipped (idempotent).
//! - `claim_ready_groups` is a single conditional update
//!   (`waiting AND pending = 0 -> claimed`), so two pollers can never both
//!   see the same group.

use async_trait::async_trait;

use crate::domain::{Dependency, DependencyId, Group, GroupId, StoreError};

#[async_trait]
pub trait DependencyStore: Send + Sync {
    /// Allocate `n` fresh pending dependencies.
    async fn new_dependencies(&self, n: usize) -> Result<Vec<Dependency>, StoreError>;

    /// Allocate an empty group in `Created` status.
    async fn new_group(&self) -> Result<GroupId, StoreError>;

    /// Fix the membership of a `Created` group and move it to `Waiting`.
    ///
    /// All-or-nothing: on error neither the status nor the membership changes.
    async fn initialize_group(
        &self,
        group: &GroupId,
        dependencies: &[DependencyId],
    ) -> Result<(), StoreError>;

    /// Move pending dependencies to the given terminal status.
    ///
    /// Non-terminal values, unknown ids and already terminal dependencies are skipped.
    async fn resolve(&self, values: &[Dependency]) -> Result<(), StoreError>;

    /// Atomically claim up to `limit` waiting groups whose pending count is zero.
    async fn claim_ready_groups(&self, limit: usize) -> Result<Vec<GroupId>, StoreError>;

    async fn load_dependencies(&self, ids: &[DependencyId]) -> Result<Vec<Dependency>, StoreError>;

    async fn load_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, StoreError>;

    /// Compensation for `new_dependencies`: drop pending dependencies that no group references.
    async fn discard_dependencies(&self, ids: &[DependencyId]) -> Result<(), StoreError>;

    /// Compensation for `new_group`: drop a group that is still `Created`.
    async fn discard_group(&self, group: &GroupId) -> Result<(), StoreError>;
}
