//! Health check extensions and report aggregation.
//!
//! Any part of the application can contribute a [`HealthCheck`] by adding a
//! binding tagged [`LIVE_CHECK`] or [`READY_CHECK`] to its registry. A
//! [`HealthReporter`] collects those bindings once and evaluates them on
//! every check:
//!   - `/live` runs the live checks, `/ready` the ready checks
//!   - `/health` runs every check, each exactly once
//!   - the overall status is UP only if every evaluated check is UP
//!   - a check that does not answer within the timeout is DOWN

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::HEALTH_CHECK_TIMEOUT_SECS;
use crate::registry::{Binding, Registry, LIVE_CHECK, READY_CHECK};

/// A failed health check, with a human-readable reason
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CheckFailure(pub String);

/// A liveness or readiness check contributed by a feature of the application.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name shown in the health report
    fn name(&self) -> &str;

    /// Run the check. `Ok` carries optional details for the report.
    async fn check(&self) -> Result<Option<Value>, CheckFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Liveness,
    Readiness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckState {
    Up,
    Down,
}

/// Outcome of a single check
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub kinds: Vec<CheckKind>,
    pub state: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated report returned by the health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: CheckState,
    pub checks: Vec<CheckReport>,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == CheckState::Up
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let status = match self.status {
            CheckState::Up => StatusCode::OK,
            CheckState::Down => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Clone)]
struct RegisteredCheck {
    check: Arc<dyn HealthCheck>,
    kinds: Vec<CheckKind>,
}

impl RegisteredCheck {
    fn from_binding(binding: &Binding) -> Option<Self> {
        let check = binding.as_health_check()?.clone();
        let mut kinds = Vec::with_capacity(2);
        if binding.has_tag(LIVE_CHECK) {
            kinds.push(CheckKind::Liveness);
        }
        if binding.has_tag(READY_CHECK) {
            kinds.push(CheckKind::Readiness);
        }
        Some(Self { check, kinds })
    }
}

/// Evaluates the health check extensions found in a registry.
#[derive(Clone)]
pub struct HealthReporter {
    name: Arc<str>,
    checks: Arc<[RegisteredCheck]>,
    timeout: Duration,
}

impl HealthReporter {
    /// Collect every tagged health check from `registry`.
    pub fn from_registry(name: &str, registry: &Registry) -> Self {
        let checks: Vec<RegisteredCheck> = registry
            .find(Binding::is_health_extension)
            .iter()
            .filter_map(|binding| {
                let check = RegisteredCheck::from_binding(binding);
                if check.is_none() {
                    tracing::warn!(
                        key = %binding.key(),
                        "Binding tagged as health check holds no check, ignoring"
                    );
                }
                check
            })
            .collect();

        Self {
            name: Arc::from(name),
            checks: checks.into(),
            timeout: Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    pub async fn liveness(&self) -> HealthReport {
        self.evaluate(Some(CheckKind::Liveness)).await
    }

    pub async fn readiness(&self) -> HealthReport {
        self.evaluate(Some(CheckKind::Readiness)).await
    }

    /// Run every check once, live and ready alike.
    pub async fn health(&self) -> HealthReport {
        self.evaluate(None).await
    }

    async fn evaluate(&self, kind: Option<CheckKind>) -> HealthReport {
        let selected = self
            .checks
            .iter()
            .filter(|c| kind.map_or(true, |k| c.kinds.contains(&k)));

        let checks = join_all(selected.map(|c| self.run_one(c))).await;

        let status = if checks.iter().all(|c| c.state == CheckState::Up) {
            CheckState::Up
        } else {
            CheckState::Down
        };

        match status {
            CheckState::Up => tracing::debug!(reporter = %self.name, ?kind, "Health check ok"),
            CheckState::Down => {
                let failed: Vec<&str> = checks
                    .iter()
                    .filter(|c| c.state == CheckState::Down)
                    .map(|c| c.name.as_str())
                    .collect();
                tracing::warn!(reporter = %self.name, ?kind, ?failed, "Health check failed");
            }
        }

        HealthReport { status, checks }
    }

    async fn run_one(&self, registered: &RegisteredCheck) -> CheckReport {
        let name = registered.check.name().to_string();
        let kinds = registered.kinds.clone();

        match tokio::time::timeout(self.timeout, registered.check.check()).await {
            Ok(Ok(data)) => CheckReport {
                name,
                kinds,
                state: CheckState::Up,
                data,
                error: None,
            },
            Ok(Err(failure)) => CheckReport {
                name,
                kinds,
                state: CheckState::Down,
                data: None,
                error: Some(failure.to_string()),
            },
            Err(_) => CheckReport {
                name,
                kinds,
                state: CheckState::Down,
                data: None,
                error: Some(format!("timed out after {}ms", self.timeout.as_millis())),
            },
        }
    }
}

/// Process uptime, always up while the process can answer.
pub struct UptimeCheck {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl UptimeCheck {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

impl Default for UptimeCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for UptimeCheck {
    fn name(&self) -> &str {
        "uptime"
    }

    async fn check(&self) -> Result<Option<Value>, CheckFailure> {
        Ok(Some(json!({
            "startedAt": self.started_at.to_rfc3339(),
            "uptimeSeconds": self.started.elapsed().as_secs(),
        })))
    }
}

/// Shared flag flipped when the main listener starts and when it begins
/// shutting down.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ready while the main application is serving traffic.
pub struct ReadinessCheck {
    readiness: Readiness,
}

impl ReadinessCheck {
    pub fn new(readiness: Readiness) -> Self {
        Self { readiness }
    }
}

#[async_trait]
impl HealthCheck for ReadinessCheck {
    fn name(&self) -> &str {
        "main-listener"
    }

    async fn check(&self) -> Result<Option<Value>, CheckFailure> {
        if self.readiness.is_ready() {
            Ok(None)
        } else {
            Err(CheckFailure("main application is not serving".to_string()))
        }
    }
}
