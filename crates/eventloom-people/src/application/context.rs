//! Storage wiring for the People context.
//!
//! The builder is created once; every operation builds a manager from a
//! [`PeopleContext`] holding the store handles it should use.

use std::sync::Arc;

use eventloom_core::builder::AggregateBuilder;
use eventloom_core::error::DomainError;
use eventloom_core::repository::{EventSaver, EventStore};
use eventloom_event_store::{
    InMemoryEventStore, InMemorySnapshotStore, JsonEventSerializer, PgEventStore, PgSnapshotStore,
    SnapshotStore, StoreConfig,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{Person, person_builder};
use crate::domain::events::{EmailChanged, NameChanged, PersonEvent};

/// Store handles for one logical operation.
#[derive(Clone)]
pub struct PeopleContext {
    pub events: Arc<dyn EventStore<Uuid, PersonEvent>>,
    pub saver: Arc<dyn EventSaver<Person, Uuid, PersonEvent>>,
    pub snapshots: Arc<dyn SnapshotStore<Uuid, Person>>,
}

impl PeopleContext {
    /// Context backed by shared in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        let snapshots = InMemorySnapshotStore::new();
        let store = InMemoryEventStore::new(Arc::new(person_serializer()))
            .with_snapshots(snapshots.clone());
        Self {
            events: Arc::new(store.clone()),
            saver: Arc::new(store),
            snapshots: Arc::new(snapshots),
        }
    }

    /// Context backed by `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfiguration` if `config` names no
    /// snapshot table.
    pub fn postgres(pool: PgPool, config: StoreConfig) -> Result<Self, DomainError> {
        let snapshot_table = config.snapshot_table.clone().ok_or_else(|| {
            DomainError::InvalidConfiguration("people require a snapshot table".to_owned())
        })?;
        let store = PgEventStore::new(pool.clone(), config, Arc::new(person_serializer()));
        Ok(Self {
            events: Arc::new(store.clone()),
            saver: Arc::new(store),
            snapshots: Arc::new(PgSnapshotStore::new(pool, snapshot_table)),
        })
    }
}

impl std::fmt::Debug for PeopleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeopleContext").finish_non_exhaustive()
    }
}

/// Serializer with every person event registered.
#[must_use]
pub fn person_serializer() -> JsonEventSerializer<PersonEvent> {
    JsonEventSerializer::new()
        .register::<NameChanged>()
        .register::<EmailChanged>()
}

/// Person builder that takes its stores from a [`PeopleContext`].
#[must_use]
pub fn people_builder() -> AggregateBuilder<Person, Uuid, PersonEvent, PeopleContext> {
    person_builder()
        .with_store(|ctx: &PeopleContext| Arc::clone(&ctx.events))
        .with_saver(|ctx: &PeopleContext| Arc::clone(&ctx.saver))
}
