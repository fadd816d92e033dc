//! Aggregate: state derived by replaying an event stream.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::event::{DomainEvent, EventRecord, StreamEvent};
use crate::stream::EventStream;
use crate::validation::{ValidationMessage, Validator};

/// Bounds required of an aggregate identifier.
pub trait AggregateId:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> AggregateId for T where
    T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Creates the initial state for an aggregate identity.
pub type Creator<S, Id> = Arc<dyn Fn(&Id) -> S + Send + Sync>;

/// Folds one event into the state. Must be deterministic: replay runs at
/// every load and again after every save.
pub type Applier<S, E> = Arc<dyn Fn(&mut S, &StreamEvent<E>) + Send + Sync>;

/// An event-sourced entity.
///
/// The state is only ever changed through the applier, either while
/// replaying committed history or when [`Aggregate::apply`] raises a new
/// event. An instance is not synchronized; callers sharing one across
/// threads must serialize access themselves.
pub struct Aggregate<S, Id, E> {
    state: S,
    stream: EventStream<Id, E>,
    applier: Applier<S, E>,
    validator: Validator<S>,
}

impl<S, Id, E> Aggregate<S, Id, E>
where
    Id: AggregateId,
    E: DomainEvent,
{
    /// Rebuilds an aggregate by folding `applier` over every committed event
    /// of `stream`, starting from `initial`.
    pub fn replay(
        initial: S,
        stream: EventStream<Id, E>,
        applier: Applier<S, E>,
        validator: Validator<S>,
    ) -> Self {
        let mut state = initial;
        for record in stream.committed_events() {
            applier(&mut state, &record.event);
        }
        Self {
            state,
            stream,
            applier,
            validator,
        }
    }

    /// Raises a new event: appends it to the uncommitted tail and applies
    /// it to the state immediately.
    pub fn apply(&mut self, event: impl Into<E>) {
        let record = self.stream.append(event.into());
        (self.applier)(&mut self.state, &record.event);
    }

    /// The aggregate identifier.
    pub fn id(&self) -> &Id {
        self.stream.id()
    }

    /// The current state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Consumes the aggregate and returns its state.
    pub fn into_state(self) -> S {
        self.state
    }

    /// The underlying event stream.
    pub fn stream(&self) -> &EventStream<Id, E> {
        &self.stream
    }

    /// Number of committed events.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.stream.version()
    }

    /// Version after the pending events are saved.
    #[must_use]
    pub fn expected_version(&self) -> i64 {
        self.stream.expected_version()
    }

    /// Returns `true` if there is anything to save.
    #[must_use]
    pub fn has_uncommitted_changes(&self) -> bool {
        self.stream.has_uncommitted_changes()
    }

    /// Events raised since the last load or save.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[EventRecord<E>] {
        self.stream.uncommitted_events()
    }

    /// Events this aggregate was rebuilt from.
    #[must_use]
    pub fn committed_events(&self) -> &[EventRecord<E>] {
        self.stream.committed_events()
    }

    /// See [`EventStream::created_on`].
    #[must_use]
    pub fn created_on(&self) -> DateTime<Utc> {
        self.stream.created_on()
    }

    /// See [`EventStream::last_modified_on`].
    #[must_use]
    pub fn last_modified_on(&self) -> DateTime<Utc> {
        self.stream.last_modified_on()
    }

    /// Runs the validator against the current state. Not cached.
    #[must_use]
    pub fn messages(&self) -> Vec<ValidationMessage> {
        (self.validator)(&self.state)
    }

    /// Returns `true` if the validator reports no messages. Not cached.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.messages().is_empty()
    }
}

impl<S: fmt::Debug, Id: fmt::Debug, E: fmt::Debug> fmt::Debug for Aggregate<S, Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("state", &self.state)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
