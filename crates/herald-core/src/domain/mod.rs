//! Domain model (IDs, dependencies, groups, tasks, resources, events, errors).

pub mod dependency;
pub mod errors;
pub mod events;
pub mod ids;
pub mod resource;
pub mod task;

pub use dependency::{Dependency, DependencySpec, DependencyStatus, Group, GroupStatus};
pub use errors::{
    BusError, ErrorKind, ResolverError, ResourceStoreError, SchedulerError, StoreError,
    TaskIndexError, TaskStoreError,
};
pub use events::{Event, TASK_CREATED, TASK_READY};
pub use ids::{DependencyId, GroupId, Id, IdMarker, ResourceId, TaskId};
pub use resource::{Resource, ResourceStatus};
pub use task::{DependenciesInfo, TaskRecord};
