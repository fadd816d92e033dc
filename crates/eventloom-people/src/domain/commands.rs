//! Commands for the People context.

use uuid::Uuid;

/// Command to set a person's name. Creates the person if the id is new.
#[derive(Debug, Clone)]
pub struct ChangeName {
    pub person_id: Uuid,
    pub firstname: String,
    pub lastname: String,
}

/// Command to set a person's email address.
#[derive(Debug, Clone)]
pub struct ChangeEmail {
    pub person_id: Uuid,
    pub email: String,
}
