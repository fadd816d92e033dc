//! The person aggregate: state, appliers and rules.

use eventloom_core::builder::AggregateBuilder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{EmailChanged, NameChanged, PersonEvent};

/// Current state of one person, derived from their events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub firstname: String,
    pub lastname: String,
    pub email: Option<String>,
}

impl Person {
    /// A person with nothing but an identity.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn name_changed(&mut self, event: &NameChanged) {
        self.firstname.clone_from(&event.firstname);
        self.lastname.clone_from(&event.lastname);
    }

    fn email_changed(&mut self, event: &EmailChanged) {
        self.email = Some(event.email.clone());
    }
}

/// Builder for person aggregates with every applier and rule registered and
/// storage left to the caller.
pub fn person_builder<C: 'static>() -> AggregateBuilder<Person, Uuid, PersonEvent, C> {
    AggregateBuilder::new(|id: &Uuid| Person::new(*id))
        .with_applier(Person::name_changed)
        .with_applier(Person::email_changed)
        .with_rule(|person| !person.firstname.is_empty(), "Firstname required")
        .with_rule(
            |person| person.email.as_deref().is_none_or(|email| email.contains('@')),
            "Email must contain @",
        )
}
