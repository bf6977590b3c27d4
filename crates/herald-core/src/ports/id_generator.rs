//! IdGenerator port - ID 生成の抽象化
//!
//! Dependency and group ids are generated without coordination between
//! replicas, so they are ULIDs (時刻でソート可能、分散生成可能).

use crate::domain::ids::{DependencyId, GroupId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_dependency_id(&self) -> DependencyId;

    fn generate_group_id(&self) -> GroupId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// The timestamp part comes from the clock so tests can pin it with `FixedClock`.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_dependency_id(&self) -> DependencyId {
        DependencyId::from_ulid(self.next_ulid())
    }

    fn generate_group_id(&self) -> GroupId {
        GroupId::from_ulid(self.next_ulid())
    }
}
