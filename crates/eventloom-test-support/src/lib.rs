//! Shared test doubles and fixtures for Eventloom.

mod clock;
pub mod fixtures;
mod repository;

pub use clock::{FixedClock, StepClock};
pub use repository::{
    ConflictingEventStore, EmptyEventStore, FailingEventStore, RecordingEventStore, SaveCall,
};
