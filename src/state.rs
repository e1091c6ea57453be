//! Shared application state for the main application's request handlers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::health::HealthReporter;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
#[derive(Clone)]
pub struct AppState {
    pub health: HealthReporter,
    pub greeting: Arc<str>,
}

impl AppState {
    pub fn new(health: HealthReporter, greeting: &str) -> Self {
        Self {
            health,
            greeting: Arc::from(greeting),
        }
    }
}

impl FromRef<AppState> for HealthReporter {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}
