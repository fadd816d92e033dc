//! Eventloom People: a small event-sourced bounded context.
//!
//! A person's name and email are never stored directly; they are rebuilt
//! from `NameChanged` and `EmailChanged` events. Saves also keep a JSON
//! snapshot per person for listing queries.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
