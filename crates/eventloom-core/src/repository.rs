//! Persistence seams: the event store contract and the loader/saver pair the
//! manager calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::{Aggregate, AggregateId};
use crate::error::DomainError;
use crate::event::{DomainEvent, EventRecord};
use crate::stream::EventStream;

/// Append-only event log keyed by stream id and version.
#[async_trait]
pub trait EventStore<Id, E>: Send + Sync {
    /// Loads every committed event of `stream_id`, ordered by version
    /// ascending. An unknown stream yields an empty list.
    async fn load_stream(&self, stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError>;

    /// Appends `new_events` at versions `from_version + 1 ..` in a single
    /// transaction and returns them as committed. Fails with
    /// `DomainError::ConcurrencyConflict` if any of those versions is taken.
    async fn save_events(
        &self,
        stream_id: &Id,
        from_version: i64,
        new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError>;
}

/// Fetches the committed stream for an aggregate identity.
#[async_trait]
pub trait EventLoader<Id, E>: Send + Sync {
    /// Loads the stream. An identity with no history yields an empty stream.
    async fn load(&self, id: &Id) -> Result<EventStream<Id, E>, DomainError>;
}

/// Persists an aggregate's uncommitted events.
#[async_trait]
pub trait EventSaver<S, Id, E>: Send + Sync {
    /// Persists exactly the uncommitted events starting at `version + 1`
    /// and returns the refreshed committed stream.
    async fn save(&self, aggregate: &Aggregate<S, Id, E>)
    -> Result<EventStream<Id, E>, DomainError>;
}

/// Adapts an [`EventStore`] into an [`EventLoader`].
pub struct StoreLoader<Id, E> {
    store: Arc<dyn EventStore<Id, E>>,
}

impl<Id, E> StoreLoader<Id, E> {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore<Id, E>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventLoader<Id, E> for StoreLoader<Id, E> {
    async fn load(&self, id: &Id) -> Result<EventStream<Id, E>, DomainError> {
        let records = self.store.load_stream(id).await?;
        Ok(EventStream::from_committed(id.clone(), records))
    }
}

/// Adapts an [`EventStore`] into an [`EventSaver`].
pub struct StoreSaver<Id, E> {
    store: Arc<dyn EventStore<Id, E>>,
}

impl<Id, E> StoreSaver<Id, E> {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore<Id, E>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S, Id, E> EventSaver<S, Id, E> for StoreSaver<Id, E>
where
    S: Send + Sync + 'static,
    Id: AggregateId,
    E: DomainEvent,
{
    async fn save(
        &self,
        aggregate: &Aggregate<S, Id, E>,
    ) -> Result<EventStream<Id, E>, DomainError> {
        let stream = aggregate.stream();
        let saved = self
            .store
            .save_events(stream.id(), stream.version(), stream.uncommitted_events())
            .await?;
        let mut committed = stream.committed_events().to_vec();
        committed.extend(saved);
        Ok(EventStream::from_committed(stream.id().clone(), committed))
    }
}

/// Loader used when no store is configured: every identity resolves to the
/// same seeded history (empty by default).
pub struct SeededLoader<E> {
    events: Vec<EventRecord<E>>,
}

impl<E> SeededLoader<E> {
    /// Creates a loader that returns `events` as committed history.
    #[must_use]
    pub fn new(events: Vec<EventRecord<E>>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventLoader<Id, E> for SeededLoader<E> {
    async fn load(&self, id: &Id) -> Result<EventStream<Id, E>, DomainError> {
        Ok(EventStream::from_committed(id.clone(), self.events.clone()))
    }
}

/// Saver used when no store is configured: commits in memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemorySaver;

#[async_trait]
impl<S, Id, E> EventSaver<S, Id, E> for InMemorySaver
where
    S: Send + Sync + 'static,
    Id: AggregateId,
    E: DomainEvent,
{
    async fn save(
        &self,
        aggregate: &Aggregate<S, Id, E>,
    ) -> Result<EventStream<Id, E>, DomainError> {
        Ok(aggregate.stream().commit())
    }
}
