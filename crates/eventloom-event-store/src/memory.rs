//! In-memory event store with the same row semantics as the Postgres one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use eventloom_core::aggregate::{Aggregate, AggregateId};
use eventloom_core::error::DomainError;
use eventloom_core::event::{DomainEvent, EventRecord};
use eventloom_core::repository::{EventSaver, EventStore};
use eventloom_core::stream::EventStream;
use serde::Serialize;

use crate::codec::{PersistedEvent, decode_row, encode_records};
use crate::error::StoreError;
use crate::serializer::EventSerializer;
use crate::snapshot::{InMemorySnapshotStore, put_snapshot};

type Rows<Id> = HashMap<Id, Vec<PersistedEvent<Id>>>;

/// Event store backed by a shared map of rows.
///
/// Clones share the same rows. Payloads go through the serializer exactly as
/// they would for Postgres, so unknown-event recovery behaves the same.
pub struct InMemoryEventStore<Id, E> {
    rows: Arc<RwLock<Rows<Id>>>,
    serializer: Arc<dyn EventSerializer<E>>,
    snapshots: Option<InMemorySnapshotStore<Id>>,
}

impl<Id: AggregateId, E: DomainEvent> InMemoryEventStore<Id, E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(serializer: Arc<dyn EventSerializer<E>>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            serializer,
            snapshots: None,
        }
    }

    /// Writes a state snapshot to `snapshots` whenever this store is used
    /// as an aggregate saver.
    #[must_use]
    pub fn with_snapshots(mut self, snapshots: InMemorySnapshotStore<Id>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Inserts a raw row, bypassing the serializer.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the row's version is
    /// already taken.
    pub fn insert_raw(&self, row: PersistedEvent<Id>) -> Result<(), DomainError> {
        let stream_id = row.stream_id.clone();
        let from_version = row.version - 1;
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        insert_rows(&mut rows, &stream_id, from_version, vec![row])
    }

    /// Rows of `stream_id` in version order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn rows(&self, stream_id: &Id) -> Result<Vec<PersistedEvent<Id>>, DomainError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(stream_id).cloned().unwrap_or_default())
    }

    fn append(
        &self,
        stream_id: &Id,
        from_version: i64,
        new_events: &[EventRecord<E>],
        snapshot: Option<(i64, serde_json::Value)>,
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        let Some(last) = new_events.last() else {
            return Ok(Vec::new());
        };
        let encoded = encode_records(self.serializer.as_ref(), stream_id, from_version, new_events)?;

        // Snapshot lock before rows; both are held until the save is done.
        let mut snapshots = match (&self.snapshots, &snapshot) {
            (Some(store), Some(_)) => Some(store.lock()?),
            _ => None,
        };
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        insert_rows(&mut rows, stream_id, from_version, encoded)?;
        if let (Some(snapshots), Some((version, state))) = (snapshots.as_mut(), snapshot) {
            put_snapshot(snapshots, stream_id, version, state, last.occurred_on);
        }
        Ok(new_events.to_vec())
    }
}

/// Appends `new_rows` unless one of their versions is already taken.
fn insert_rows<Id: AggregateId>(
    rows: &mut Rows<Id>,
    stream_id: &Id,
    from_version: i64,
    new_rows: Vec<PersistedEvent<Id>>,
) -> Result<(), DomainError> {
    let existing = rows.entry(stream_id.clone()).or_default();
    let taken: HashSet<i64> = existing.iter().map(|row| row.version).collect();
    if new_rows.iter().any(|row| taken.contains(&row.version)) {
        let actual = taken.iter().copied().max().unwrap_or(0);
        tracing::debug!(%stream_id, from_version, actual, "version already taken");
        return Err(DomainError::ConcurrencyConflict {
            aggregate_id: stream_id.to_string(),
            expected: from_version,
            actual,
        });
    }
    existing.extend(new_rows);
    existing.sort_by_key(|row| row.version);
    Ok(())
}

impl<Id, E> Clone for InMemoryEventStore<Id, E>
where
    Id: Clone,
{
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            serializer: Arc::clone(&self.serializer),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<Id, E> std::fmt::Debug for InMemoryEventStore<Id, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("snapshots", &self.snapshots.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventStore<Id, E> for InMemoryEventStore<Id, E> {
    #[tracing::instrument(skip_all, fields(stream_id = %stream_id))]
    async fn load_stream(&self, stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError> {
        let rows = self.rows(stream_id)?;
        Ok(rows
            .into_iter()
            .map(|row| decode_row(self.serializer.as_ref(), row))
            .collect())
    }

    #[tracing::instrument(
        skip_all,
        fields(stream_id = %stream_id, from_version = from_version, count = new_events.len())
    )]
    async fn save_events(
        &self,
        stream_id: &Id,
        from_version: i64,
        new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        self.append(stream_id, from_version, new_events, None)
    }
}

#[async_trait]
impl<S, Id, E> EventSaver<S, Id, E> for InMemoryEventStore<Id, E>
where
    S: Serialize + Send + Sync + 'static,
    Id: AggregateId,
    E: DomainEvent,
{
    #[tracing::instrument(
        skip_all,
        fields(stream_id = %aggregate.id(), from_version = aggregate.version())
    )]
    async fn save(
        &self,
        aggregate: &Aggregate<S, Id, E>,
    ) -> Result<EventStream<Id, E>, DomainError> {
        let stream = aggregate.stream();
        let snapshot = match &self.snapshots {
            Some(_) => Some((
                aggregate.expected_version(),
                serde_json::to_value(aggregate.state()).map_err(StoreError::from)?,
            )),
            None => None,
        };
        let saved = self.append(
            stream.id(),
            stream.version(),
            stream.uncommitted_events(),
            snapshot,
        )?;
        let mut committed = stream.committed_events().to_vec();
        committed.extend(saved);
        Ok(EventStream::from_committed(stream.id().clone(), committed))
    }
}
