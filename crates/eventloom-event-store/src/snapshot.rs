//! Read-side state snapshots.
//!
//! A snapshot is the JSON-encoded state of an aggregate as of its last save.
//! Stores write them next to the events when configured to; the engine never
//! reads them back, so they only serve queries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventloom_core::aggregate::AggregateId;
use eventloom_core::clock::{Clock, SystemClock};
use eventloom_core::error::DomainError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::config::TableName;
use crate::error::StoreError;

/// The latest saved state of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<Id, S> {
    pub aggregate_id: Id,
    /// Stream version the state was derived from.
    pub version: i64,
    pub state: S,
    pub updated_at: DateTime<Utc>,
}

/// Query-side access to state snapshots.
#[async_trait]
pub trait SnapshotStore<Id, S>: Send + Sync {
    /// Inserts or replaces the snapshot of `aggregate_id`.
    async fn upsert(&self, aggregate_id: &Id, version: i64, state: &S) -> Result<(), DomainError>;

    /// Returns the snapshot of `aggregate_id`, if any.
    async fn find_by_id(&self, aggregate_id: &Id) -> Result<Option<Snapshot<Id, S>>, DomainError>;

    /// Returns every snapshot, ordered by aggregate id.
    async fn list_all(&self) -> Result<Vec<Snapshot<Id, S>>, DomainError>;
}

#[derive(Debug, Clone)]
pub(crate) struct StoredSnapshot {
    version: i64,
    state: serde_json::Value,
    updated_at: DateTime<Utc>,
}

pub(crate) type SnapshotMap<Id> = HashMap<Id, StoredSnapshot>;

/// Stores `state` unless a snapshot of a later version is already there.
pub(crate) fn put_snapshot<Id: AggregateId>(
    snapshots: &mut SnapshotMap<Id>,
    aggregate_id: &Id,
    version: i64,
    state: serde_json::Value,
    updated_at: DateTime<Utc>,
) {
    match snapshots.get(aggregate_id) {
        Some(current) if current.version > version => {
            tracing::debug!(
                %aggregate_id,
                current = current.version,
                version,
                "older snapshot ignored"
            );
        }
        _ => {
            snapshots.insert(
                aggregate_id.clone(),
                StoredSnapshot {
                    version,
                    state,
                    updated_at,
                },
            );
        }
    }
}

/// Snapshot store backed by a shared map.
///
/// Snapshots written by a save are stamped with the newest saved event's
/// `occurred_on`; direct upserts use the store's clock.
#[derive(Clone)]
pub struct InMemorySnapshotStore<Id> {
    snapshots: Arc<RwLock<SnapshotMap<Id>>>,
    clock: Arc<dyn Clock>,
}

impl<Id: AggregateId> InMemorySnapshotStore<Id> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock stamping `updated_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Takes the write lock. A store saving events and snapshots together
    /// holds this guard for the whole save.
    pub(crate) fn lock(&self) -> Result<RwLockWriteGuard<'_, SnapshotMap<Id>>, StoreError> {
        self.snapshots.write().map_err(|_| StoreError::Poisoned)
    }

    fn write(
        &self,
        aggregate_id: &Id,
        version: i64,
        state: serde_json::Value,
    ) -> Result<(), StoreError> {
        let updated_at = self.clock.now();
        let mut snapshots = self.lock()?;
        put_snapshot(&mut snapshots, aggregate_id, version, state, updated_at);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let snapshots = Arc::clone(&self.snapshots);
        let _ = std::thread::spawn(move || {
            let _guard = snapshots.write();
            panic!("poisoning snapshot lock");
        })
        .join();
    }

    fn decode<S: DeserializeOwned>(
        aggregate_id: &Id,
        stored: &StoredSnapshot,
    ) -> Result<Snapshot<Id, S>, StoreError> {
        Ok(Snapshot {
            aggregate_id: aggregate_id.clone(),
            version: stored.version,
            state: serde_json::from_value(stored.state.clone())?,
            updated_at: stored.updated_at,
        })
    }
}

impl<Id: AggregateId> Default for InMemorySnapshotStore<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: std::fmt::Debug> std::fmt::Debug for InMemorySnapshotStore<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySnapshotStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<Id, S> SnapshotStore<Id, S> for InMemorySnapshotStore<Id>
where
    Id: AggregateId,
    S: Serialize + DeserializeOwned + Send + Sync,
{
    async fn upsert(&self, aggregate_id: &Id, version: i64, state: &S) -> Result<(), DomainError> {
        let state = serde_json::to_value(state).map_err(StoreError::from)?;
        self.write(aggregate_id, version, state)
            .map_err(DomainError::from)
    }

    async fn find_by_id(&self, aggregate_id: &Id) -> Result<Option<Snapshot<Id, S>>, DomainError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots
            .get(aggregate_id)
            .map(|stored| Self::decode(aggregate_id, stored))
            .transpose()?)
    }

    async fn list_all(&self) -> Result<Vec<Snapshot<Id, S>>, DomainError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        let mut all = snapshots
            .iter()
            .map(|(id, stored)| Self::decode(id, stored))
            .collect::<Result<Vec<Snapshot<Id, S>>, StoreError>>()?;
        all.sort_by_cached_key(|snapshot| snapshot.aggregate_id.to_string());
        Ok(all)
    }
}

/// Inserts or replaces one snapshot row, unless the stored row is of a later
/// version. Runs on any executor so a store can call it inside the
/// transaction that appends the events.
pub(crate) async fn upsert_snapshot_row<'e>(
    executor: impl PgExecutor<'e>,
    table: &TableName,
    aggregate_id: Uuid,
    version: i64,
    state: serde_json::Value,
    updated_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO {table} (aggregate_id, version, state, updated_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (aggregate_id) DO UPDATE \
         SET version = EXCLUDED.version, state = EXCLUDED.state, updated_at = EXCLUDED.updated_at \
         WHERE {table}.version <= EXCLUDED.version",
        table = table.quoted()
    );
    sqlx::query(&sql)
        .bind(aggregate_id)
        .bind(version)
        .bind(sqlx::types::Json(state))
        .bind(updated_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Snapshot store backed by a Postgres table.
///
/// Stamping follows [`InMemorySnapshotStore`]: the event store's transactional
/// write uses the newest event's `occurred_on`, direct upserts the clock.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
    table: TableName,
    clock: Arc<dyn Clock>,
}

impl PgSnapshotStore {
    /// Creates a store over `table`.
    #[must_use]
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self {
            pool,
            table,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock stamping `updated_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn decode_row<S: DeserializeOwned>(
        row: &sqlx::postgres::PgRow,
    ) -> Result<Snapshot<Uuid, S>, StoreError> {
        let state: sqlx::types::Json<serde_json::Value> = row.try_get("state")?;
        Ok(Snapshot {
            aggregate_id: row.try_get("aggregate_id")?,
            version: row.try_get("version")?,
            state: serde_json::from_value(state.0)?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl std::fmt::Debug for PgSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSnapshotStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> SnapshotStore<Uuid, S> for PgSnapshotStore
where
    S: Serialize + DeserializeOwned + Send + Sync,
{
    #[tracing::instrument(skip(self, state), fields(table = %self.table))]
    async fn upsert(&self, aggregate_id: &Uuid, version: i64, state: &S) -> Result<(), DomainError> {
        let state = serde_json::to_value(state).map_err(StoreError::from)?;
        upsert_snapshot_row(
            &self.pool,
            &self.table,
            *aggregate_id,
            version,
            state,
            self.clock.now(),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn find_by_id(&self, aggregate_id: &Uuid) -> Result<Option<Snapshot<Uuid, S>>, DomainError> {
        let sql = format!(
            "SELECT aggregate_id, version, state, updated_at FROM {} WHERE aggregate_id = $1",
            self.table.quoted()
        );
        let row = sqlx::query(&sql)
            .bind(aggregate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(row.as_ref().map(Self::decode_row).transpose()?)
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn list_all(&self) -> Result<Vec<Snapshot<Uuid, S>>, DomainError> {
        let sql = format!(
            "SELECT aggregate_id, version, state, updated_at FROM {} ORDER BY aggregate_id",
            self.table.quoted()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(rows
            .iter()
            .map(Self::decode_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
