//! Domain layer for the People context.

pub mod aggregates;
pub mod commands;
pub mod events;
