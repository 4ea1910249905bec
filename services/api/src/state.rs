//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: the session store, the tutoring agent, and the
//! startup configuration.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::{session::SessionStore, tutor::TutorAgent};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub tutor: Arc<TutorAgent>,
    pub config: Arc<Config>,
}
