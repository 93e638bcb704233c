//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to every session. It holds the room registry and the runtime
//! configuration. Clone is required by Axum; both fields are cheap to clone.

use std::sync::Arc;

use crate::config::Config;
use crate::services::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { registry: Registry::new(config.room.clone()), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
