//! Eventloom Core: event-sourced aggregates.
//!
//! An aggregate's state is never stored; it is rebuilt by replaying the
//! aggregate's committed event stream through a registered applier. New
//! events are raised through [`Aggregate::apply`] and persisted with
//! optimistic concurrency by [`AggregateManager::save`]. This crate contains
//! no infrastructure code: stores plug in through the traits in
//! [`repository`].

pub mod aggregate;
pub mod builder;
pub mod clock;
pub mod error;
pub mod event;
pub mod manager;
pub mod repository;
pub mod stream;
pub mod validation;

pub use aggregate::{Aggregate, AggregateId, Applier, Creator};
pub use builder::{AggregateBuilder, EventHandlers};
pub use clock::{Clock, SystemClock};
pub use error::DomainError;
pub use event::{DomainEvent, EventKind, EventRecord, StreamEvent, UnknownEvent};
pub use manager::{AggregateManager, AggregateOptions, InvalidStatePolicy, SaveError};
pub use repository::{EventLoader, EventSaver, EventStore};
pub use stream::EventStream;
pub use validation::{ValidationMessage, ValidationRule, Validator};
