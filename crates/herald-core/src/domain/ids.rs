//! Domain identifiers (strongly-typed IDs).
//!
//! All identifiers are opaque strings on the wire: task ids arrive from the
//! event bus as raw bytes, dependency and group ids are generated by the
//! store. `Id<T>` wraps the string and uses a phantom marker so that a
//! `GroupId` can never be passed where a `DependencyId` is expected.
//!
//! ## Phantom Type パターン
//! `T` は実行時には使わないマーカー型（PhantomData）で、
//! コンパイル時の型安全性だけを提供します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// `KIND` is used in error messages ("dependency", "group", ...).
pub trait IdMarker: Send + Sync + 'static {
    const KIND: &'static str;
}

/// ジェネリック ID 型
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap an existing opaque id (e.g. a task id read from an event payload).
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(ulid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    pub fn kind() -> &'static str {
        T::KIND
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> AsRef<str> for Id<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    const KIND: &'static str = "task";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {}

impl IdMarker for Dependency {
    const KIND: &'static str = "dependency";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {}

impl IdMarker for Group {
    const KIND: &'static str = "group";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {}

impl IdMarker for Resource {
    const KIND: &'static str = "resource";
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a spawned task (owned by the external task store).
pub type TaskId = Id<Task>;

/// Identifier of a single prerequisite.
pub type DependencyId = Id<Dependency>;

/// Identifier of the set of prerequisites one task waits on.
pub type GroupId = Id<Group>;

/// Identifier of a resource in the external resource store.
pub type ResourceId = Id<Resource>;
