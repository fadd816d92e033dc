//! Test stores: mock `EventStore` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use eventloom_core::aggregate::AggregateId;
use eventloom_core::error::DomainError;
use eventloom_core::event::{DomainEvent, EventRecord};
use eventloom_core::repository::EventStore;

/// One recorded `save_events` call.
#[derive(Debug, Clone)]
pub struct SaveCall<Id, E> {
    pub stream_id: Id,
    pub from_version: i64,
    pub events: Vec<EventRecord<E>>,
}

/// An event store that records every call. Returns the configured history
/// from `load_stream` on every call and accepts every append.
#[derive(Debug)]
pub struct RecordingEventStore<Id, E> {
    history: Vec<EventRecord<E>>,
    loads: AtomicUsize,
    saves: Mutex<Vec<SaveCall<Id, E>>>,
}

impl<Id: Clone, E: Clone> RecordingEventStore<Id, E> {
    /// Creates a store that returns `history` from every `load_stream` call.
    #[must_use]
    pub fn new(history: Vec<EventRecord<E>>) -> Self {
        Self {
            history,
            loads: AtomicUsize::new(0),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Number of `load_stream` calls so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Snapshot of every `save_events` call so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn save_calls(&self) -> Vec<SaveCall<Id, E>> {
        self.saves.lock().unwrap().clone()
    }
}

impl<Id: Clone, E: Clone> Default for RecordingEventStore<Id, E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventStore<Id, E> for RecordingEventStore<Id, E> {
    async fn load_stream(&self, _stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.clone())
    }

    async fn save_events(
        &self,
        stream_id: &Id,
        from_version: i64,
        new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        self.saves.lock().unwrap().push(SaveCall {
            stream_id: stream_id.clone(),
            from_version,
            events: new_events.to_vec(),
        });
        Ok(new_events.to_vec())
    }
}

/// An event store with no history that silently accepts appends.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEventStore;

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventStore<Id, E> for EmptyEventStore {
    async fn load_stream(&self, _stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError> {
        Ok(vec![])
    }

    async fn save_events(
        &self,
        _stream_id: &Id,
        _from_version: i64,
        new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        Ok(new_events.to_vec())
    }
}

/// An event store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEventStore;

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventStore<Id, E> for FailingEventStore {
    async fn load_stream(&self, _stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn save_events(
        &self,
        _stream_id: &Id,
        _from_version: i64,
        _new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// An event store whose every append loses a race against another writer
/// that already reached `actual`.
#[derive(Debug, Clone, Copy)]
pub struct ConflictingEventStore {
    pub actual: i64,
}

#[async_trait]
impl<Id: AggregateId, E: DomainEvent> EventStore<Id, E> for ConflictingEventStore {
    async fn load_stream(&self, _stream_id: &Id) -> Result<Vec<EventRecord<E>>, DomainError> {
        Ok(vec![])
    }

    async fn save_events(
        &self,
        stream_id: &Id,
        from_version: i64,
        _new_events: &[EventRecord<E>],
    ) -> Result<Vec<EventRecord<E>>, DomainError> {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: stream_id.to_string(),
            expected: from_version,
            actual: self.actual,
        })
    }
}
