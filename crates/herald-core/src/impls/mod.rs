//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryDependencyStore**: カウンタ方式の依存ストア（単一プロセス用）
//! - **SqliteDependencyStore**: 同じアルゴリズムの SQLite 版（feature `sqlite`）
//! - **ResourceResolver**: リソースの Ready を待つ resolver
//! - InMemory{EventBus, ResourceStore, TaskStore, TaskToGroup, BindingStore}:
//!   外部コラボレータの開発用実装

pub mod inmem_bindings;
pub mod inmem_bus;
pub mod inmem_dependencies;
pub mod inmem_resources;
pub mod inmem_task_to_group;
pub mod inmem_tasks;
pub mod resource_resolver;
#[cfg(feature = "sqlite")]
pub mod sqlite_dependencies;

pub use self::inmem_bindings::InMemoryBindingStore;
pub use self::inmem_bus::InMemoryEventBus;
pub use self::inmem_dependencies::InMemoryDependencyStore;
pub use self::inmem_resources::InMemoryResourceStore;
pub use self::inmem_task_to_group::InMemoryTaskToGroup;
pub use self::inmem_tasks::InMemoryTaskStore;
pub use self::resource_resolver::{RESOURCE_RESOLVER, ResourceResolver};
#[cfg(feature = "sqlite")]
pub use self::sqlite_dependencies::SqliteDependencyStore;
