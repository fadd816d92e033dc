//! Eventloom Event Store: persistence for event-sourced aggregates.
//!
//! Provides the `PostgreSQL` and in-memory implementations of the core
//! `EventStore` trait, the tag-keyed payload serializer, the row codec with
//! unknown-event recovery, and optional state snapshots.

pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod pg_event_store;
pub mod schema;
pub mod serializer;
pub mod snapshot;

pub use codec::PersistedEvent;
pub use config::{StoreConfig, TableName};
pub use error::StoreError;
pub use memory::InMemoryEventStore;
pub use pg_event_store::PgEventStore;
pub use serializer::{EventSerializer, JsonEventSerializer};
pub use snapshot::{InMemorySnapshotStore, PgSnapshotStore, Snapshot, SnapshotStore};
