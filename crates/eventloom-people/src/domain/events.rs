//! Domain events for the People context.

use eventloom_core::domain_events;
use serde::{Deserialize, Serialize};

/// Emitted when a person's name is set or corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChanged {
    pub firstname: String,
    pub lastname: String,
}

/// Emitted when a person's email address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChanged {
    pub email: String,
}

domain_events! {
    /// Every event a person's stream can hold.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PersonEvent {
        NameChanged(NameChanged) => "NameChanged",
        EmailChanged(EmailChanged) => "EmailChanged",
    }
}

impl NameChanged {
    #[must_use]
    pub fn new(firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        Self {
            firstname: firstname.into(),
            lastname: lastname.into(),
        }
    }
}
