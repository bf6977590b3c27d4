//! SQLite dependency store.
//!
//! Same counting algorithm as the in-memory store, expressed as conditional
//! updates inside transactions. The claim is one `UPDATE ... RETURNING`
//! statement, so concurrent pollers on a shared database never see the same
//! group.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::domain::{
    Dependency, DependencyId, DependencyStatus, Group, GroupId, GroupStatus, StoreError,
};
use crate::ports::{DependencyStore, IdGenerator, SystemClock, UlidGenerator};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS dependencies (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS groups (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        pending INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS group_dependencies (
        group_id TEXT NOT NULL,
        dependency_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (group_id, dependency_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_group_dependencies_dependency
        ON group_dependencies(dependency_id)",
    "CREATE INDEX IF NOT EXISTS idx_groups_claimable ON groups(status, pending)",
];

/// SQLite-backed `DependencyStore`.
#[derive(Clone)]
pub struct SqliteDependencyStore {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl SqliteDependencyStore {
    /// Open (or create) a database, e.g. `sqlite://herald.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database for tests.
    ///
    /// Limited to one connection: every new `:memory:` connection would
    /// otherwise open its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn parse_dependency_status(raw: &str) -> Result<DependencyStatus, StoreError> {
    DependencyStatus::from_str(raw).map_err(StoreError::Backend)
}

fn parse_group_status(raw: &str) -> Result<GroupStatus, StoreError> {
    GroupStatus::from_str(raw).map_err(StoreError::Backend)
}

#[async_trait]
impl DependencyStore for SqliteDependencyStore {
    async fn new_dependencies(&self, n: usize) -> Result<Vec<Dependency>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let created: Vec<Dependency> = (0..n)
            .map(|_| Dependency::pending(self.ids.generate_dependency_id()))
            .collect();

        let mut tx = self.pool.begin().await?;
        for dep in &created {
            sqlx::query("INSERT INTO dependencies (id, status) VALUES (?, ?)")
                .bind(dep.id.as_str())
                .bind(dep.status.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(created)
    }

    async fn new_group(&self) -> Result<GroupId, StoreError> {
        let id = self.ids.generate_group_id();
        sqlx::query("INSERT INTO groups (id, status, pending) VALUES (?, ?, 0)")
            .bind(id.as_str())
            .bind(GroupStatus::Created.as_str())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn initialize_group(
        &self,
        group: &GroupId,
        dependencies: &[DependencyId],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("UPDATE groups SET status = ? WHERE id = ? AND status = ?")
            .bind(GroupStatus::Initializing.as_str())
            .bind(group.as_str())
            .bind(GroupStatus::Created.as_str())
            .execute(&mut *tx)
            .await?;

        if locked.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM groups WHERE id = ?")
                .bind(group.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            // dropping `tx` rolls back
            return Err(match exists {
                Some(_) => StoreError::AlreadyInitialized(group.clone()),
                None => StoreError::GroupNotFound(group.clone()),
            });
        }

        let mut seen = HashSet::new();
        let mut pending: u32 = 0;
        let mut position: i64 = 0;
        for id in dependencies {
            if !seen.insert(id) {
                continue;
            }

            let row = sqlx::query("SELECT status FROM dependencies WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::UnknownDependency(id.clone()))?;
            let status: String = row.try_get("status")?;
            if parse_dependency_status(&status)? == DependencyStatus::Pending {
                pending = pending
                    .checked_add(1)
                    .ok_or_else(|| StoreError::TooManyDependencies(group.clone()))?;
            }

            sqlx::query(
                "INSERT INTO group_dependencies (group_id, dependency_id, position)
                VALUES (?, ?, ?)",
            )
            .bind(group.as_str())
            .bind(id.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
            position += 1;
        }

        sqlx::query("UPDATE groups SET status = ?, pending = ? WHERE id = ?")
            .bind(GroupStatus::Waiting.as_str())
            .bind(i64::from(pending))
            .bind(group.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(group_id = %group, pending, "group initialized");
        Ok(())
    }

    async fn resolve(&self, values: &[Dependency]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for value in values {
            if !value.status.is_terminal() {
                continue;
            }

            let flipped = sqlx::query("UPDATE dependencies SET status = ? WHERE id = ? AND status = ?")
                .bind(value.status.as_str())
                .bind(value.id.as_str())
                .bind(DependencyStatus::Pending.as_str())
                .execute(&mut *tx)
                .await?;
            if flipped.rows_affected() == 0 {
                continue;
            }

            sqlx::query(
                "UPDATE groups SET pending = pending - 1
                WHERE pending > 0
                  AND id IN (SELECT group_id FROM group_dependencies WHERE dependency_id = ?)",
            )
            .bind(value.id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn claim_ready_groups(&self, limit: usize) -> Result<Vec<GroupId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "UPDATE groups SET status = ?
            WHERE id IN (
                SELECT id FROM groups
                WHERE status = ? AND pending = 0
                ORDER BY id
                LIMIT ?
            )
            RETURNING id",
        )
        .bind(GroupStatus::Claimed.as_str())
        .bind(GroupStatus::Waiting.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id").map(GroupId::new))
            .collect::<Result<Vec<_>, _>>()?;
        claimed.sort();
        Ok(claimed)
    }

    async fn load_dependencies(&self, ids: &[DependencyId]) -> Result<Vec<Dependency>, StoreError> {
        let mut seen = HashSet::new();
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let row = sqlx::query("SELECT status FROM dependencies WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                let status: String = row.try_get("status")?;
                loaded.push(Dependency {
                    id: id.clone(),
                    status: parse_dependency_status(&status)?,
                });
            }
        }
        Ok(loaded)
    }

    async fn load_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, StoreError> {
        let mut seen = HashSet::new();
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let Some(row) = sqlx::query("SELECT status, pending FROM groups WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?
            else {
                continue;
            };
            let status: String = row.try_get("status")?;
            let pending: i64 = row.try_get("pending")?;

            let members = sqlx::query(
                "SELECT d.id AS id, d.status AS status
                FROM group_dependencies gd
                JOIN dependencies d ON d.id = gd.dependency_id
                WHERE gd.group_id = ?
                ORDER BY gd.position",
            )
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;

            let mut dependencies = Vec::with_capacity(members.len());
            for member in members {
                let dep_id: String = member.try_get("id")?;
                let dep_status: String = member.try_get("status")?;
                dependencies.push(Dependency {
                    id: DependencyId::new(dep_id),
                    status: parse_dependency_status(&dep_status)?,
                });
            }

            loaded.push(Group {
                id: id.clone(),
                status: parse_group_status(&status)?,
                pending: u32::try_from(pending).map_err(|_| {
                    StoreError::Backend(format!("group {id} has a corrupt pending count {pending}"))
                })?,
                dependencies,
            });
        }
        Ok(loaded)
    }

    async fn discard_dependencies(&self, ids: &[DependencyId]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(
                "DELETE FROM dependencies
                WHERE id = ? AND status = ?
                  AND NOT EXISTS (SELECT 1 FROM group_dependencies WHERE dependency_id = ?)",
            )
            .bind(id.as_str())
            .bind(DependencyStatus::Pending.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn discard_group(&self, group: &GroupId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM groups WHERE id = ? AND status = ?")
            .bind(group.as_str())
            .bind(GroupStatus::Created.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
