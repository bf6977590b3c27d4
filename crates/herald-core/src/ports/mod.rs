//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。各 trait は外部システム
//! （依存関係ストア、イベントバス、リソースストア、タスクストア）への
//! インターフェースで、実装の詳細を隠蔽します。
//!
//! - DependencyStore が readiness の正本
//! - Resolver は依存を外部条件に結びつけ、満たされたものを通知する
//! - それ以外は外部コラボレータ（impls に開発用のインメモリ実装あり）

pub mod binding_store;
pub mod clock;
pub mod dependency_store;
pub mod event_bus;
pub mod id_generator;
pub mod resolver;
pub mod resource_store;
pub mod task_store;
pub mod task_to_group;

pub use self::binding_store::{Binding, BindingStatus, BindingStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dependency_store::DependencyStore;
pub use self::event_bus::EventBus;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::resolver::{RegistryError, Resolver, ResolverRegistry};
pub use self::resource_store::ResourceStore;
pub use self::task_store::TaskStore;
pub use self::task_to_group::TaskToGroup;
