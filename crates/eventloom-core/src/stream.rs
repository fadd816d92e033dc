//! Event stream: committed history plus pending events for one aggregate.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::event::{DomainEvent, EventRecord};

/// Ordered event history of one aggregate identity.
///
/// The committed part is never changed in place. New events only go to the
/// uncommitted tail, and [`EventStream::commit`] returns a new stream.
pub struct EventStream<Id, E> {
    id: Id,
    committed: Arc<[EventRecord<E>]>,
    uncommitted: Vec<EventRecord<E>>,
    clock: Arc<dyn Clock>,
}

impl<Id, E: DomainEvent> EventStream<Id, E> {
    /// Creates an empty stream.
    #[must_use]
    pub fn empty(id: Id) -> Self {
        Self::from_committed(id, Vec::new())
    }

    /// Creates a stream whose committed history is `records`, in the order
    /// given (ascending version).
    #[must_use]
    pub fn from_committed(id: Id, records: Vec<EventRecord<E>>) -> Self {
        Self {
            id,
            committed: records.into(),
            uncommitted: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp appended events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The aggregate identity this stream belongs to.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Number of committed events.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn version(&self) -> i64 {
        self.committed.len() as i64
    }

    /// Version the stream will have once the uncommitted events are saved.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn expected_version(&self) -> i64 {
        self.version() + self.uncommitted.len() as i64
    }

    /// Returns `true` if events are waiting to be saved.
    #[must_use]
    pub fn has_uncommitted_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Timestamp of the first committed event, or the clock's current time
    /// for a stream with no history.
    #[must_use]
    pub fn created_on(&self) -> DateTime<Utc> {
        self.committed
            .first()
            .map_or_else(|| self.clock.now(), |record| record.occurred_on)
    }

    /// Timestamp of the last committed event, or the clock's current time
    /// for a stream with no history.
    #[must_use]
    pub fn last_modified_on(&self) -> DateTime<Utc> {
        self.committed
            .last()
            .map_or_else(|| self.clock.now(), |record| record.occurred_on)
    }

    /// Committed events in ascending version order.
    #[must_use]
    pub fn committed_events(&self) -> &[EventRecord<E>] {
        &self.committed
    }

    /// Pending events in append order.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[EventRecord<E>] {
        &self.uncommitted
    }

    /// Appends an event to the uncommitted tail, stamped with the current
    /// time. Performs no validation.
    pub fn append(&mut self, event: E) -> &EventRecord<E> {
        let record = EventRecord::new(event, self.clock.now());
        self.uncommitted.push(record);
        &self.uncommitted[self.uncommitted.len() - 1]
    }

    /// Returns a new stream whose history is the committed events followed
    /// by the uncommitted ones, with nothing pending.
    #[must_use]
    pub fn commit(&self) -> Self
    where
        Id: Clone,
    {
        let committed: Vec<EventRecord<E>> = self
            .committed
            .iter()
            .chain(self.uncommitted.iter())
            .cloned()
            .collect();
        Self {
            id: self.id.clone(),
            committed: committed.into(),
            uncommitted: Vec::new(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<Id: Clone, E: Clone> Clone for EventStream<Id, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            committed: Arc::clone(&self.committed),
            uncommitted: self.uncommitted.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<Id: fmt::Debug, E: fmt::Debug> fmt::Debug for EventStream<Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("id", &self.id)
            .field("committed", &self.committed)
            .field("uncommitted", &self.uncommitted)
            .finish_non_exhaustive()
    }
}
