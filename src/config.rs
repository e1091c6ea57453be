//! Configuration loading and constants.
//!
//! Configuration is assembled in three layers: built-in defaults, an optional
//! TOML file, then environment overrides (`HTTPS_PORT`, `HOST`, `HTTP_PORT`,
//! `LOG_FORMAT`). `AppConfig` is the root configuration struct and is treated
//! as immutable once the servers start.

use const_format::formatcp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// =============================================================================
// Server Defaults
// =============================================================================

/// Default port of the main HTTPS server
pub const DEFAULT_HTTPS_PORT: u16 = 3000;

/// Bind address used when no host is configured
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default grace period for keep-alive connections on close (5 seconds)
pub const DEFAULT_GRACE_PERIOD_FOR_CLOSE_MS: u64 = 5000;

/// Upper bound for a single health check before it is reported down
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Environment Variables
// =============================================================================

/// Main server port override
pub const ENV_HTTPS_PORT: &str = "HTTPS_PORT";

/// Main server bind host
pub const ENV_HOST: &str = "HOST";

/// Health sub-application port override
pub const ENV_HTTP_PORT: &str = "HTTP_PORT";

/// Log format override ("text" or "json")
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Directory holding the bundled TLS material
pub const SSL_CONFIG_DIR: &str = "ssl-config";

/// Default TLS certificate, relative to the executable's directory
pub const DEFAULT_CERT_PATH: &str = formatcp!("../{}/server-cert.pem", SSL_CONFIG_DIR);

/// Default TLS private key, relative to the executable's directory
pub const DEFAULT_KEY_PATH: &str = formatcp!("../{}/server-key.pem", SSL_CONFIG_DIR);

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "ping_server=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Wire protocol of a listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// REST server configuration
    #[serde(default)]
    pub rest: RestConfig,
    /// Health sub-application settings
    #[serde(default)]
    pub health: HealthAppConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport settings for one REST listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    #[serde(default = "RestConfig::default_port")]
    pub port: u16,
    /// Bind host; all interfaces when unset
    pub host: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// How long keep-alive connections may drain on close; `0` closes
    /// sockets immediately.
    #[serde(default = "RestConfig::default_grace_period")]
    pub grace_period_for_close_ms: u64,
    #[serde(default)]
    pub openapi_spec: OpenApiSpecOptions,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            host: None,
            protocol: Protocol::default(),
            cert_path: None,
            key_path: None,
            grace_period_for_close_ms: Self::default_grace_period(),
            openapi_spec: OpenApiSpecOptions::default(),
        }
    }
}

impl RestConfig {
    fn default_port() -> u16 {
        DEFAULT_HTTPS_PORT
    }

    fn default_grace_period() -> u64 {
        DEFAULT_GRACE_PERIOD_FOR_CLOSE_MS
    }

    /// Host to bind, falling back to all interfaces
    pub fn bind_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_BIND_HOST)
    }
}

/// OpenAPI document options passed through to the REST layer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenApiSpecOptions {
    /// Derive the advertised server URL from the incoming request
    #[serde(default = "OpenApiSpecOptions::default_set_servers_from_request")]
    pub set_servers_from_request: bool,
}

impl Default for OpenApiSpecOptions {
    fn default() -> Self {
        Self {
            set_servers_from_request: Self::default_set_servers_from_request(),
        }
    }
}

impl OpenApiSpecOptions {
    fn default_set_servers_from_request() -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthAppConfig {
    /// Explicit health listener port, overriding the derived one
    pub port: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and the process environment.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load configuration, reading environment overrides through `env`.
    pub fn load_with_env<P, F>(path: Option<P>, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => AppConfig::default(),
        };

        config.apply_env(env)?;

        if config.rest.protocol == Protocol::Https
            && (config.rest.cert_path.is_none() || config.rest.key_path.is_none())
        {
            let exe = std::env::current_exe().map_err(ConfigError::InstallDir)?;
            let (cert_path, key_path) = default_tls_paths(&exe);
            config.rest.cert_path.get_or_insert(cert_path);
            config.rest.key_path.get_or_insert(key_path);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = lookup(ENV_HTTPS_PORT) {
            self.rest.port = parse_port(ENV_HTTPS_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_HOST) {
            self.rest.host = Some(value);
        }
        if let Some(value) = lookup(ENV_HTTP_PORT) {
            self.health.port = Some(parse_port(ENV_HTTP_PORT, &value)?);
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rest.protocol == Protocol::Https
            && (self.rest.cert_path.is_none() || self.rest.key_path.is_none())
        {
            return Err(ConfigError::Validation(
                "https requires rest.cert_path and rest.key_path".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "Unknown logging.format '{}', expected \"text\" or \"json\"",
                other
            ))),
        }
    }
}

/// Bundled certificate and key paths for an application installed at `exe`.
///
/// The files live in `ssl-config/` one level above the executable's
/// directory, e.g. `<prefix>/bin/ping-server` reads
/// `<prefix>/ssl-config/server-cert.pem`.
pub fn default_tls_paths(exe: &Path) -> (PathBuf, PathBuf) {
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    (dir.join(DEFAULT_CERT_PATH), dir.join(DEFAULT_KEY_PATH))
}

/// Coerce an environment value to a port number
pub fn parse_port(var: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort {
            var,
            value: value.to_string(),
        })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Cannot locate the installed executable: {0}")]
    InstallDir(std::io::Error),
    #[error("Invalid port in {var}: '{value}'")]
    InvalidPort { var: &'static str, value: String },
    #[error("Health port overflows: main port {0} has no successor")]
    PortOverflow(u16),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_with_env(None::<&Path>, env_of(&[])).unwrap();
        assert_eq!(config.rest.port, 3000);
        assert_eq!(config.rest.protocol, Protocol::Https);
        assert_eq!(config.rest.host, None);
        assert_eq!(config.rest.bind_host(), "0.0.0.0");
        assert_eq!(config.rest.grace_period_for_close_ms, 5000);
        assert!(config.rest.openapi_spec.set_servers_from_request);
        let (cert_path, key_path) = default_tls_paths(&std::env::current_exe().unwrap());
        assert_eq!(config.rest.cert_path, Some(cert_path));
        assert_eq!(config.rest.key_path, Some(key_path));
        assert_eq!(config.health.port, None);
    }

    #[test]
    fn test_default_tls_paths_follow_install_dir() {
        let (cert_path, key_path) = default_tls_paths(Path::new("/opt/ping/bin/ping-server"));
        assert_eq!(
            cert_path,
            PathBuf::from("/opt/ping/bin/../ssl-config/server-cert.pem")
        );
        assert_eq!(
            key_path,
            PathBuf::from("/opt/ping/bin/../ssl-config/server-key.pem")
        );
    }

    #[test]
    fn test_configured_tls_paths_are_kept() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[rest]
cert_path = "/etc/ping/cert.pem"
"#
        )
        .unwrap();

        let config = AppConfig::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(config.rest.cert_path, Some(PathBuf::from("/etc/ping/cert.pem")));
        // Only the missing one falls back to the bundled file
        let (_, key_path) = default_tls_paths(&std::env::current_exe().unwrap());
        assert_eq!(config.rest.key_path, Some(key_path));
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("HTTPS_PORT", "8443"),
            ("HOST", "127.0.0.1"),
            ("HTTP_PORT", "9000"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = AppConfig::load_with_env(None::<&Path>, env).unwrap();
        assert_eq!(config.rest.port, 8443);
        assert_eq!(config.rest.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.health.port, Some(9000));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let env = env_of(&[("HTTPS_PORT", ""), ("HTTP_PORT", "  "), ("HOST", "")]);
        let config = AppConfig::load_with_env(None::<&Path>, env).unwrap();
        assert_eq!(config.rest.port, 3000);
        assert_eq!(config.health.port, None);
        assert_eq!(config.rest.host, None);
    }

    #[test]
    fn test_non_numeric_port_is_rejected() {
        let err = AppConfig::load_with_env(None::<&Path>, env_of(&[("HTTP_PORT", "abc")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPort { var: "HTTP_PORT", .. }
        ));

        let err = AppConfig::load_with_env(None::<&Path>, env_of(&[("HTTPS_PORT", "70000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPort { var: "HTTPS_PORT", .. }
        ));
    }

    #[test]
    fn test_toml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[rest]
port = 4000
protocol = "http"
grace_period_for_close_ms = 0

[health]
port = 4100
"#
        )
        .unwrap();

        let config = AppConfig::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(config.rest.port, 4000);
        assert_eq!(config.rest.protocol, Protocol::Http);
        assert_eq!(config.rest.grace_period_for_close_ms, 0);
        assert_eq!(config.health.port, Some(4100));
        // Plain HTTP gets no TLS material
        assert_eq!(config.rest.cert_path, None);

        let config =
            AppConfig::load_with_env(Some(file.path()), env_of(&[("HTTPS_PORT", "5000")]))
                .unwrap();
        assert_eq!(config.rest.port, 5000);
    }

    #[test]
    fn test_grace_period_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[rest]\ngrace_period_for_close_ms = 250\n").unwrap();
        let config = AppConfig::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(config.rest.grace_period_for_close_ms, 250);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[rest]\ngrace_period_for_close_ms = -1\n").unwrap();
        let err = AppConfig::load_with_env(Some(file.path()), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_log_format() {
        let err = AppConfig::load_with_env(None::<&Path>, env_of(&[("LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_config_file() {
        let err = AppConfig::load_with_env(Some("/nonexistent/ping-server.toml"), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
