//! ping-server: an HTTPS ping service with a plain-HTTP health listener.
//!
//! The main application serves `/ping` over HTTPS. A health sub-application
//! listens on a second, plain-HTTP port, answers `/health` with the live and
//! ready checks copied from the main application's registry, and redirects
//! everything else to the main application's `/ping`.

pub mod app;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;
pub mod subapp;

pub use app::{start, AppHandle, MainApplication, Started};
pub use config::AppConfig;
pub use error::AppError;
pub use subapp::HealthSubApplication;
