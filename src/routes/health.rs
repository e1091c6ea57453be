//! Health check endpoints for container orchestration.
//!
//! `/health` reports every registered live and ready check, `/live` and
//! `/ready` report one kind each. All three answer 200 when every selected
//! check is up and 503 otherwise, with the per-check report as JSON.

use axum::extract::State;

use crate::health::{HealthReport, HealthReporter};

pub const HEALTH_PATH: &str = "/health";
pub const LIVE_PATH: &str = "/live";
pub const READY_PATH: &str = "/ready";

/// Combined liveness and readiness report.
pub async fn health(State(reporter): State<HealthReporter>) -> HealthReport {
    reporter.health().await
}

pub async fn live(State(reporter): State<HealthReporter>) -> HealthReport {
    reporter.liveness().await
}

pub async fn ready(State(reporter): State<HealthReporter>) -> HealthReport {
    reporter.readiness().await
}
