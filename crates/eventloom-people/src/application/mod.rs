//! Application layer for the People context.

pub mod command_handlers;
pub mod context;
pub mod query_handlers;
