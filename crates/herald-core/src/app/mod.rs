//! App - アプリケーション層
//!
//! ports を組み合わせてスケジューリングのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング（fail-fast 検証）
//! - **SchedulingManager**: 登録（saga）と準備完了タスクの収集
//! - **SchedulingService**: `task:created` → 登録、準備完了 → `task:ready`
//! - **ready_groups**: 準備完了グループのポーリングとクレーム
//! - **Saga**: 補償付きステップ
//! - **RetryPolicy**: 失敗した resolve のバックオフ

pub mod builder;
pub mod manager;
pub mod ready_poller;
pub mod retry;
pub mod saga;
pub mod service;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::manager::SchedulingManager;
pub use self::ready_poller::ready_groups;
pub use self::retry::RetryPolicy;
pub use self::saga::{Compensation, Saga};
pub use self::service::SchedulingService;
