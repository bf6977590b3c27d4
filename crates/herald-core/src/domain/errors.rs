//! Errors - エラー型と分類
//!
//! Each port has its own error enum; `SchedulerError` is what the manager and
//! the service surface, and `ErrorKind` is the operational classification
//! used when logging.

use thiserror::Error;

use super::ids::{DependencyId, GroupId, TaskId};

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misconfiguration (unknown resolver, malformed dependency data). Retrying will not help.
    Configuration,
    /// Storage, bus or task store failure. Redelivery may succeed.
    Transient,
    /// Data integrity problem, e.g. a claimed group without a task.
    Inconsistency,
    /// A referenced record does not exist.
    NotFound,
}

/// Errors returned by a `DependencyStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("group {0} is already initialized")]
    AlreadyInitialized(GroupId),

    #[error("dependency {0} not found")]
    UnknownDependency(DependencyId),

    #[error("group {0} has more pending dependencies than the counter can hold")]
    TooManyDependencies(GroupId),

    #[error("storage backend: {0}")]
    Backend(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Errors returned by a `Resolver`.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("invalid binding data: {0}")]
    InvalidData(String),

    #[error("binding storage: {0}")]
    Storage(String),

    #[error("resource store: {0}")]
    Resources(#[from] ResourceStoreError),
}

#[derive(Debug, Error)]
pub enum TaskIndexError {
    #[error("no group bound to task {0}")]
    GroupNotFound(TaskId),

    #[error("no task bound to group {0}")]
    TaskNotFound(GroupId),

    #[error("task {task} is already bound to group {group}")]
    AlreadyBound { task: TaskId, group: GroupId },
}

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task store: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ResourceStoreError {
    #[error("resource store: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to publish to '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    #[error("failed to subscribe: {0}")]
    Subscribe(String),
}

/// Error surfaced by the scheduling manager and service.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no resolver registered for '{0}'")]
    UnknownResolver(String),

    #[error("resolver '{name}' failed: {source}")]
    Resolver {
        name: String,
        #[source]
        source: ResolverError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    TaskIndex(#[from] TaskIndexError),

    #[error(transparent)]
    TaskStore(#[from] TaskStoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl SchedulerError {
    pub fn resolver(name: impl Into<String>, source: ResolverError) -> Self {
        SchedulerError::Resolver {
            name: name.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::UnknownResolver(_) => ErrorKind::Configuration,
            SchedulerError::Resolver { source, .. } => match source {
                ResolverError::InvalidData(_) => ErrorKind::Configuration,
                ResolverError::Storage(_) | ResolverError::Resources(_) => ErrorKind::Transient,
            },
            SchedulerError::Store(err) => match err {
                StoreError::GroupNotFound(_) | StoreError::UnknownDependency(_) => {
                    ErrorKind::NotFound
                }
                StoreError::AlreadyInitialized(_) => ErrorKind::Inconsistency,
                StoreError::TooManyDependencies(_) => ErrorKind::Configuration,
                StoreError::Backend(_) => ErrorKind::Transient,
            },
            SchedulerError::TaskIndex(err) => match err {
                TaskIndexError::TaskNotFound(_) | TaskIndexError::GroupNotFound(_) => {
                    ErrorKind::Inconsistency
                }
                TaskIndexError::AlreadyBound { .. } => ErrorKind::Inconsistency,
            },
            SchedulerError::TaskStore(err) => match err {
                TaskStoreError::NotFound(_) => ErrorKind::NotFound,
                TaskStoreError::Backend(_) => ErrorKind::Transient,
            },
            SchedulerError::Bus(_) => ErrorKind::Transient,
        }
    }
}
