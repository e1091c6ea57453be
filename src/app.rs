//! Main application and process bootstrap.
//!
//! `MainApplication` owns the HTTPS REST listener and the registry that
//! features contribute bindings to. [`start`] performs the startup sequence:
//! main application boot and start, then health sub-application
//! construction (which needs the main URL) and start.

use std::sync::Arc;

use serde_json::json;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::health::{HealthReporter, Readiness, ReadinessCheck, UptimeCheck};
use crate::http::shutdown;
use crate::http::{start_server, RunningServer};
use crate::registry::{Binding, BindingValue, Registry, LIVE_CHECK, READY_CHECK};
use crate::routes::create_router;
use crate::state::AppState;
use crate::subapp::HealthSubApplication;

pub const MAIN_APP: &str = "main";

pub const REST_COMPONENT_KEY: &str = "components.RestComponent";
pub const HEALTH_COMPONENT_KEY: &str = "components.HealthComponent";
pub const GREETING_KEY: &str = "ping.greeting";
pub const UPTIME_CHECK_KEY: &str = "health.checks.uptime";
pub const READINESS_CHECK_KEY: &str = "health.checks.main-listener";

pub const DEFAULT_GREETING: &str = "Hello from ping-server";

/// What the health sub-application needs from a started main application.
#[derive(Debug, Clone)]
pub struct AppHandle {
    root_url: String,
    registry: Registry,
}

impl AppHandle {
    pub fn new(root_url: impl Into<String>, registry: Registry) -> Self {
        Self {
            root_url: root_url.into(),
            registry,
        }
    }

    /// Public root URL of the main REST server
    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub struct MainApplication {
    config: Arc<AppConfig>,
    registry: Registry,
    readiness: Readiness,
    booted: bool,
    server: Option<RunningServer>,
}

impl MainApplication {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Registry::new(),
            readiness: Readiness::new(),
            booted: false,
            server: None,
        }
    }

    /// Register the built-in components and health check extensions.
    ///
    /// Calling it again is a no-op.
    pub fn boot(&mut self) {
        if self.booted {
            return;
        }

        self.registry.add(Binding::new(
            REST_COMPONENT_KEY,
            BindingValue::Component("rest"),
        ));
        self.registry.add(Binding::new(
            HEALTH_COMPONENT_KEY,
            BindingValue::Component("health"),
        ));
        self.registry.add(Binding::new(
            GREETING_KEY,
            BindingValue::Constant(json!(DEFAULT_GREETING)),
        ));
        self.registry.add(
            Binding::new(
                UPTIME_CHECK_KEY,
                BindingValue::HealthCheck(Arc::new(UptimeCheck::new())),
            )
            .tag(LIVE_CHECK),
        );
        self.registry.add(
            Binding::new(
                READINESS_CHECK_KEY,
                BindingValue::HealthCheck(Arc::new(ReadinessCheck::new(self.readiness.clone()))),
            )
            .tag(READY_CHECK),
        );

        self.booted = true;
        tracing::debug!(bindings = self.registry.len(), "Main application booted");
    }

    /// Contribute a binding, e.g. a feature's health check.
    ///
    /// Bindings are frozen once the application has started.
    pub fn add_binding(&mut self, binding: Binding) -> Result<(), AppError> {
        if self.server.is_some() {
            return Err(AppError::AlreadyStarted(MAIN_APP));
        }
        self.registry.add(binding);
        Ok(())
    }

    /// Start the REST listener and mark the application ready.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.server.is_some() {
            return Err(AppError::AlreadyStarted(MAIN_APP));
        }
        self.boot();

        let reporter = HealthReporter::from_registry(MAIN_APP, &self.registry);
        let state = AppState::new(reporter, &self.greeting());
        let router = create_router(state);

        tracing::info!(
            set_servers_from_request = self.config.rest.openapi_spec.set_servers_from_request,
            grace_period_for_close_ms = self.config.rest.grace_period_for_close_ms,
            "Starting main application"
        );
        let server = start_server(router, &self.config.rest, MAIN_APP).await?;
        self.server = Some(server);
        self.readiness.set_ready();
        Ok(())
    }

    fn greeting(&self) -> String {
        match self.registry.get(GREETING_KEY).map(Binding::value) {
            Some(BindingValue::Constant(serde_json::Value::String(greeting))) => greeting.clone(),
            _ => DEFAULT_GREETING.to_string(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Root URL of the REST server, once started
    pub fn url(&self) -> Option<&str> {
        self.server.as_ref().map(RunningServer::url)
    }

    /// Handle for composing sub-applications, once started
    pub fn handle(&self) -> Result<AppHandle, AppError> {
        let url = self.url().ok_or(AppError::NotStarted(MAIN_APP))?;
        Ok(AppHandle::new(url, self.registry.clone()))
    }

    /// Report not ready, then close the listener.
    pub fn stop(&self) {
        self.readiness.set_not_ready();
        if let Some(server) = &self.server {
            server.stop();
        }
    }

    /// Wait for the listener to exit.
    pub async fn wait(&mut self) -> Result<(), AppError> {
        match self.server.as_mut() {
            Some(server) => Ok(server.wait().await?),
            None => Ok(()),
        }
    }
}

/// Both applications, bound and serving.
pub struct Started {
    pub main: MainApplication,
    pub health: HealthSubApplication,
}

/// Construct, boot and start the main application, then the health
/// sub-application.
pub async fn start(config: AppConfig) -> Result<Started, AppError> {
    let mut main = MainApplication::new(config);
    main.boot();
    main.start().await?;

    let health = match start_health(&main).await {
        Ok(health) => health,
        Err(e) => {
            main.stop();
            if let Err(wait_err) = main.wait().await {
                tracing::warn!(error = %wait_err, "Main application did not stop cleanly");
            }
            return Err(e);
        }
    };

    let started = Started { main, health };
    started.log_urls();
    Ok(started)
}

async fn start_health(main: &MainApplication) -> Result<HealthSubApplication, AppError> {
    let mut health = HealthSubApplication::new(&main.handle()?, main.config())?;
    health.start().await?;
    Ok(health)
}

impl Started {
    fn log_urls(&self) {
        let url = self.main.url().unwrap_or_default();
        let health_url = self.health.url().unwrap_or_default();
        tracing::info!("Server is running at {}", url);
        tracing::info!("Try {}/ping", url);
        tracing::info!("Health check: {}/health", health_url);
        tracing::info!("{}/ping will be redirected to {}/ping", health_url, url);
    }

    /// Stop both listeners, the health sub-application first.
    pub fn stop(&self) {
        self.health.stop();
        self.main.stop();
    }

    /// Wait for both listeners to exit.
    pub async fn wait(&mut self) -> Result<(), AppError> {
        let health = self.health.wait().await;
        let main = self.main.wait().await;
        health.and(main)
    }

    /// Serve until a shutdown signal arrives or a listener exits on its own,
    /// then stop both.
    pub async fn run_until_shutdown(&mut self) -> Result<(), AppError> {
        let early_exit = tokio::select! {
            _ = shutdown::wait_for_signal() => None,
            result = self.main.wait() => Some((MAIN_APP, result)),
            result = self.health.wait() => Some((crate::subapp::HEALTH_APP, result)),
        };

        self.stop();
        let remaining = self.wait().await;

        match early_exit {
            Some((name, Err(e))) => {
                tracing::error!(server = name, error = %e, "Server exited unexpectedly");
                Err(e)
            }
            Some((name, Ok(()))) => {
                tracing::warn!(server = name, "Server exited before shutdown was requested");
                remaining
            }
            None => remaining,
        }
    }
}
