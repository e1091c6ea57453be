//! Health sub-application.
//!
//! A plain-HTTP listener running next to the main HTTPS server, for load
//! balancers and orchestrators that cannot speak TLS. It answers `/health`
//! with the same live and ready checks as the main application and
//! redirects every other request to the main application's `/ping`.
//!
//! The port is chosen in priority order:
//! 1. the explicit override (`HTTP_PORT` / `health.port`)
//! 2. `0` when the main application's configured port is `0`
//! 3. the main application's configured port plus one

use crate::app::{AppHandle, HEALTH_COMPONENT_KEY, REST_COMPONENT_KEY};
use crate::config::{AppConfig, ConfigError, Protocol};
use crate::error::AppError;
use crate::health::HealthReporter;
use crate::http::redirect::RedirectTarget;
use crate::http::{start_server, RunningServer};
use crate::registry::{Binding, BindingValue, Registry};
use crate::routes::create_health_router;

pub const HEALTH_APP: &str = "health";

/// Pick the health listener port.
pub fn resolve_health_port(override_port: Option<u16>, main_port: u16) -> Result<u16, ConfigError> {
    match override_port {
        Some(port) => Ok(port),
        None if main_port == 0 => Ok(0),
        None => main_port
            .checked_add(1)
            .ok_or(ConfigError::PortOverflow(main_port)),
    }
}

pub struct HealthSubApplication {
    config: AppConfig,
    registry: Registry,
    redirect: RedirectTarget,
    server: Option<RunningServer>,
}

impl HealthSubApplication {
    /// Derive the sub-application from a started main application.
    ///
    /// Copies the main application's live and ready check bindings, and only
    /// those, into the sub-application's own registry. A copied binding may
    /// not reuse the key of one of the sub-application's own components.
    pub fn new(main: &AppHandle, main_config: &AppConfig) -> Result<Self, AppError> {
        let port = resolve_health_port(main_config.health.port, main_config.rest.port)?;

        let mut config = main_config.clone();
        config.rest.port = port;
        config.rest.protocol = Protocol::Http;
        config.rest.cert_path = None;
        config.rest.key_path = None;

        let mut registry = Registry::new();
        registry.add(Binding::new(
            REST_COMPONENT_KEY,
            BindingValue::Component("rest"),
        ));
        registry.add(Binding::new(
            HEALTH_COMPONENT_KEY,
            BindingValue::Component("health"),
        ));

        let extensions = main.registry().find(Binding::is_health_extension);
        let keys: Vec<&str> = extensions.iter().map(Binding::key).collect();
        tracing::debug!(?keys, "Copying health check extensions from main application");
        for binding in extensions {
            if registry.contains_key(binding.key()) {
                return Err(AppError::DuplicateBinding {
                    app: HEALTH_APP,
                    key: binding.key().to_string(),
                });
            }
            registry.add(binding);
        }

        Ok(Self {
            config,
            registry,
            redirect: RedirectTarget::ping_of(main.root_url()),
            server: None,
        })
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.server.is_some() {
            return Err(AppError::AlreadyStarted(HEALTH_APP));
        }

        let reporter = HealthReporter::from_registry(HEALTH_APP, &self.registry);
        tracing::info!(
            port = self.config.rest.port,
            checks = reporter.check_count(),
            redirect = %self.redirect.location(),
            "Starting health sub-application"
        );

        let router = create_health_router(reporter, self.redirect.clone());
        self.server = Some(start_server(router, &self.config.rest, HEALTH_APP).await?);
        Ok(())
    }

    /// Configured port; `0` means OS-assigned
    pub fn port(&self) -> u16 {
        self.config.rest.port
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn redirect_location(&self) -> &str {
        self.redirect.location()
    }

    /// Root URL of the health listener, once started
    pub fn url(&self) -> Option<&str> {
        self.server.as_ref().map(RunningServer::url)
    }

    pub fn stop(&self) {
        if let Some(server) = &self.server {
            server.stop();
        }
    }

    pub async fn wait(&mut self) -> Result<(), AppError> {
        match self.server.as_mut() {
            Some(server) => Ok(server.wait().await?),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::RestConfig;
    use crate::health::UptimeCheck;
    use crate::registry::{LIVE_CHECK, READY_CHECK};

    #[test]
    fn test_port_override_wins() {
        assert_eq!(resolve_health_port(Some(9000), 3000).unwrap(), 9000);
        assert_eq!(resolve_health_port(Some(9000), 0).unwrap(), 9000);
        assert_eq!(resolve_health_port(Some(0), 3000).unwrap(), 0);
    }

    #[test]
    fn test_ephemeral_main_port_stays_ephemeral() {
        assert_eq!(resolve_health_port(None, 0).unwrap(), 0);
    }

    #[test]
    fn test_next_port() {
        assert_eq!(resolve_health_port(None, 3000).unwrap(), 3001);
        assert_eq!(resolve_health_port(None, 65534).unwrap(), 65535);
        assert!(matches!(
            resolve_health_port(None, 65535),
            Err(ConfigError::PortOverflow(65535))
        ));
    }

    fn main_registry() -> Registry {
        let check = || BindingValue::HealthCheck(Arc::new(UptimeCheck::new()));
        let mut registry = Registry::new();
        registry.add(Binding::new(REST_COMPONENT_KEY, BindingValue::Component("rest")));
        registry.add(Binding::new("checks.live", check()).tag(LIVE_CHECK));
        registry.add(Binding::new("checks.ready", check()).tag(READY_CHECK).tag("extra"));
        registry.add(Binding::new("checks.untagged", check()));
        registry.add(Binding::new("greeting", BindingValue::Constant(json!("hi"))).tag("ping"));
        registry
    }

    fn https_config(port: u16) -> AppConfig {
        AppConfig {
            rest: RestConfig {
                port,
                host: Some("localhost".to_string()),
                cert_path: Some("cert.pem".into()),
                key_path: Some("key.pem".into()),
                ..RestConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_copies_only_health_extensions() {
        let handle = AppHandle::new("https://localhost:3000", main_registry());
        let sub = HealthSubApplication::new(&handle, &https_config(3000)).unwrap();

        let keys: Vec<_> = sub.registry().keys().collect();
        assert_eq!(
            keys,
            vec![
                REST_COMPONENT_KEY,
                HEALTH_COMPONENT_KEY,
                "checks.live",
                "checks.ready"
            ]
        );

        // Copied unmodified
        let ready = sub.registry().get("checks.ready").unwrap();
        assert!(ready.has_tag(READY_CHECK));
        assert!(ready.has_tag("extra"));
        let original = handle.registry().get("checks.ready").unwrap();
        assert!(Arc::ptr_eq(
            ready.as_health_check().unwrap(),
            original.as_health_check().unwrap()
        ));
    }

    #[test]
    fn test_tagged_binding_cannot_replace_component() {
        let mut registry = main_registry();
        registry.add(
            Binding::new(
                HEALTH_COMPONENT_KEY,
                BindingValue::HealthCheck(Arc::new(UptimeCheck::new())),
            )
            .tag(LIVE_CHECK),
        );
        let handle = AppHandle::new("https://localhost:3000", registry);

        let result = HealthSubApplication::new(&handle, &https_config(3000));
        assert!(matches!(
            result,
            Err(AppError::DuplicateBinding { app: "health", ref key }) if key == HEALTH_COMPONENT_KEY
        ));
    }

    #[test]
    fn test_derived_config() {
        let handle = AppHandle::new("https://localhost:3000", Registry::new());
        let sub = HealthSubApplication::new(&handle, &https_config(3000)).unwrap();

        assert_eq!(sub.port(), 3001);
        assert_eq!(sub.config().rest.protocol, Protocol::Http);
        assert_eq!(sub.config().rest.host.as_deref(), Some("localhost"));
        assert_eq!(sub.config().rest.cert_path, None);
        assert_eq!(sub.config().rest.key_path, None);
        assert_eq!(sub.config().rest.grace_period_for_close_ms, 5000);
        assert_eq!(sub.redirect_location(), "https://localhost:3000/ping");
        assert_eq!(sub.url(), None);
    }

    #[test]
    fn test_derived_config_with_override() {
        let handle = AppHandle::new("https://localhost:0", Registry::new());
        let mut config = https_config(0);
        assert_eq!(
            HealthSubApplication::new(&handle, &config).unwrap().port(),
            0
        );

        config.health.port = Some(8080);
        assert_eq!(
            HealthSubApplication::new(&handle, &config).unwrap().port(),
            8080
        );
    }

    #[test]
    fn test_port_overflow_is_startup_error() {
        let handle = AppHandle::new("https://localhost:65535", Registry::new());
        let result = HealthSubApplication::new(&handle, &https_config(65535));
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::PortOverflow(65535)))
        ));
    }
}
