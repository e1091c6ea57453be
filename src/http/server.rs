//! HTTP/HTTPS listener startup.
//!
//! Supports two protocols:
//! - HTTPS: certificate and key loaded from PEM files
//! - HTTP: plain listener, used by the health sub-application
//!
//! Listeners run on a spawned task driven by an `axum_server::Handle`, so the
//! caller gets the bound address back before traffic is served and can stop
//! the listener later with the configured grace period.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::config::{Protocol, RestConfig};

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Failed to resolve bind address {0}")]
    Resolve(String),

    #[error("Failed to load TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// A listener that is bound and serving.
pub struct RunningServer {
    name: &'static str,
    url: String,
    local_addr: SocketAddr,
    handle: Handle,
    grace_period: Duration,
    task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl RunningServer {
    /// Root URL, without trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and close open ones.
    ///
    /// Keep-alive connections get the configured grace period to drain;
    /// a zero grace period closes them at once.
    pub fn stop(&self) {
        if self.grace_period.is_zero() {
            tracing::info!(server = self.name, "Closing server immediately");
            self.handle.shutdown();
            return;
        }

        tracing::info!(
            server = self.name,
            grace_ms = self.grace_period.as_millis() as u64,
            "Graceful shutdown initiated"
        );
        self.handle.graceful_shutdown(Some(self.grace_period));
    }

    /// Wait for the listener task to finish.
    ///
    /// The outcome is reported once; later calls return `Ok` immediately.
    /// Dropping the future before completion leaves the task untouched.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Server(e.to_string())),
        };
        self.task = None;
        result
    }

    /// Whether the listener task has already exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

/// Start a listener for `app` based on `config`.
///
/// Returns once the socket is bound, or with the bind error.
pub async fn start_server(
    app: Router,
    config: &RestConfig,
    name: &'static str,
) -> Result<RunningServer, ServerError> {
    let addr = resolve_addr(config.bind_host(), config.port).await?;
    let handle = Handle::new();

    let task = match config.protocol {
        Protocol::Http => {
            tracing::info!(server = name, %addr, "Starting HTTP server (no TLS)");
            spawn_plain_server(app, addr, handle.clone())
        }
        Protocol::Https => {
            let (cert_path, key_path) = match (&config.cert_path, &config.key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err(ServerError::TlsConfig(
                        "https requires a certificate and a key".to_string(),
                    ))
                }
            };
            tracing::info!(
                server = name,
                %addr,
                cert = %cert_path.display(),
                key = %key_path.display(),
                "Starting HTTPS server"
            );

            install_crypto_provider();
            let rustls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| {
                    ServerError::TlsConfig(format!(
                        "Failed to load certificates from {} and {}: {}",
                        cert_path.display(),
                        key_path.display(),
                        e
                    ))
                })?;
            spawn_tls_server(app, addr, rustls_config, handle.clone())
        }
    };

    // `listening` resolves to None when the server stops before binding
    let local_addr = match handle.listening().await {
        Some(local_addr) => local_addr,
        None => {
            return Err(match task.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => ServerError::Server("server exited before listening".to_string()),
                Err(e) => ServerError::Server(e.to_string()),
            })
        }
    };

    let url = root_url(config.protocol, config.host.as_deref(), local_addr);
    tracing::info!(server = name, %local_addr, %url, "Server listening");

    Ok(RunningServer {
        name,
        url,
        local_addr,
        handle,
        grace_period: Duration::from_millis(config.grace_period_for_close_ms),
        task: Some(task),
    })
}

fn spawn_plain_server(
    app: Router,
    addr: SocketAddr,
    handle: Handle,
) -> JoinHandle<Result<(), ServerError>> {
    tokio::spawn(async move {
        axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(ServerError::Bind)
    })
}

fn spawn_tls_server(
    app: Router,
    addr: SocketAddr,
    rustls_config: RustlsConfig,
    handle: Handle,
) -> JoinHandle<Result<(), ServerError>> {
    tokio::spawn(async move {
        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(ServerError::Bind)
    })
}

/// Pin aws-lc-rs as the process-wide rustls provider.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ServerError::Resolve(format!("{}:{}: {}", host, port, e)))?;
    addrs
        .next()
        .ok_or_else(|| ServerError::Resolve(format!("{}:{}", host, port)))
}

/// Build the public root URL of a listener.
///
/// A configured host name is kept as is. Unspecified addresses (all
/// interfaces) are rendered as the matching loopback address so the URL is
/// usable from the same machine.
pub fn root_url(protocol: Protocol, host: Option<&str>, local_addr: SocketAddr) -> String {
    let host = match host {
        Some(host) => match host.parse::<IpAddr>() {
            Ok(ip) => format_ip(display_ip(ip)),
            Err(_) => host.to_string(),
        },
        None => format_ip(display_ip(local_addr.ip())),
    };
    format!("{}://{}:{}", protocol, host, local_addr.port())
}

fn display_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    }
}

fn format_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}
