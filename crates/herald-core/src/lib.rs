//! herald-core
//!
//! Dependency-driven task scheduling: a task becomes ready exactly once,
//! when every one of its dependencies has been resolved.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, dependency, group, task, resource, events, errors）
//! - **ports**: 抽象化レイヤー（DependencyStore, Resolver, TaskToGroup, TaskStore, EventBus, など）
//! - **impls**: 実装（InMemoryDependencyStore, SqliteDependencyStore, ResourceResolver, インメモリのコラボレータ）
//! - **app**: アプリケーションロジック（builder, manager, service, ready_poller, saga）
//! - **config**: 設定（JSON、全項目にデフォルトあり）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
