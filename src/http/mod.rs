//! HTTP server module with TLS support.
//!
//! This module provides the listener plumbing shared by both applications:
//! - **HTTPS** for the main application, with certificate and key from PEM files
//! - **HTTP** for the health sub-application
//!
//! Plus the redirect middleware used by the health listener and shutdown
//! signal handling.

pub mod redirect;
pub mod server;
pub mod shutdown;

pub use server::{start_server, RunningServer, ServerError};
