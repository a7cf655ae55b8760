//! Mentor API Library Crate
//!
//! This library contains all the logic for the tutoring web service: the
//! application state, database access, speech client, API handlers, and
//! routing. The `bin/api.rs` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod speech;
pub mod state;
pub mod tts;
