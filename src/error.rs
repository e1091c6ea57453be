use crate::config::ConfigError;
use crate::http::ServerError;

/// Startup and lifecycle errors. All of them are fatal for the process.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("The {0} application is already started")]
    AlreadyStarted(&'static str),

    #[error("The {0} application is not started")]
    NotStarted(&'static str),

    #[error("Binding {key} is already registered in the {app} application")]
    DuplicateBinding { app: &'static str, key: String },
}
