//! Command handlers for the People context.
//!
//! Each handler loads the person, raises one event and saves. Conflicts are
//! returned to the caller; nothing is retried here.

use eventloom_core::error::DomainError;
use eventloom_core::manager::AggregateManager;
use uuid::Uuid;

use crate::domain::aggregates::Person;
use crate::domain::commands::{ChangeEmail, ChangeName};
use crate::domain::events::{EmailChanged, NameChanged, PersonEvent};

/// Manager type every handler runs against.
pub type PersonManager = AggregateManager<Person, Uuid, PersonEvent>;

/// Handles `ChangeName` and returns the person's new version.
///
/// # Errors
///
/// Returns `DomainError` if loading or saving fails.
#[tracing::instrument(skip(manager), fields(person_id = %command.person_id))]
pub async fn handle_change_name(
    command: &ChangeName,
    manager: &PersonManager,
) -> Result<i64, DomainError> {
    let mut person = manager.load(command.person_id).await?;
    person.apply(NameChanged::new(
        command.firstname.clone(),
        command.lastname.clone(),
    ));
    let saved = manager.save(person).await?;
    Ok(saved.version())
}

/// Handles `ChangeEmail` and returns the person's new version.
///
/// # Errors
///
/// Returns `DomainError` if loading or saving fails.
#[tracing::instrument(skip(manager), fields(person_id = %command.person_id))]
pub async fn handle_change_email(
    command: &ChangeEmail,
    manager: &PersonManager,
) -> Result<i64, DomainError> {
    let mut person = manager.load(command.person_id).await?;
    person.apply(EmailChanged {
        email: command.email.clone(),
    });
    let saved = manager.save(person).await?;
    Ok(saved.version())
}
