//! Query handlers for the People context.

use eventloom_core::error::DomainError;
use eventloom_event_store::{Snapshot, SnapshotStore};
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::PersonManager;
use crate::domain::aggregates::Person;

/// Read-only view of a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonView {
    pub person_id: Uuid,
    pub firstname: String,
    pub lastname: String,
    pub email: Option<String>,
    /// Number of events the view was derived from.
    pub version: i64,
}

impl PersonView {
    fn from_state(person: &Person, version: i64) -> Self {
        Self {
            person_id: person.id,
            firstname: person.firstname.clone(),
            lastname: person.lastname.clone(),
            email: person.email.clone(),
            version,
        }
    }
}

impl From<Snapshot<Uuid, Person>> for PersonView {
    fn from(snapshot: Snapshot<Uuid, Person>) -> Self {
        Self::from_state(&snapshot.state, snapshot.version)
    }
}

/// Rebuilds one person from their events. Returns `None` for an id with no
/// history.
///
/// # Errors
///
/// Returns `DomainError` if loading fails.
pub async fn get_person_by_id(
    person_id: Uuid,
    manager: &PersonManager,
) -> Result<Option<PersonView>, DomainError> {
    let person = manager.load(person_id).await?;
    if person.version() == 0 {
        return Ok(None);
    }
    Ok(Some(PersonView::from_state(person.state(), person.version())))
}

/// Lists every person from the snapshot table, ordered by id.
///
/// # Errors
///
/// Returns `DomainError` if the snapshot store fails.
pub async fn list_people(
    snapshots: &dyn SnapshotStore<Uuid, Person>,
) -> Result<Vec<PersonView>, DomainError> {
    let all = snapshots.list_all().await?;
    Ok(all.into_iter().map(PersonView::from).collect())
}
