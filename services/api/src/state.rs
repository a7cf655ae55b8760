//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the session store and service clients.

use crate::config::Config;
use crate::db::Db;
use crate::speech::SpeechClient;
use mentor_core::runner::TurnRunner;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Db>,
    pub runner: Arc<TurnRunner>,
    pub speech: Arc<dyn SpeechClient>,
    pub config: Arc<Config>,
}
