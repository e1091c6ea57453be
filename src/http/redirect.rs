//! Redirect from the health listener to the main application.
//!
//! The health sub-application answers `/health` itself. Every other request
//! is short-circuited with a `302 Found` pointing at the main application's
//! `/ping` endpoint and never reaches the router.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::LOCATION;
use http::StatusCode;

use crate::routes::health::HEALTH_PATH;

/// Where non-health requests are sent.
#[derive(Debug, Clone)]
pub struct RedirectTarget(Arc<str>);

impl RedirectTarget {
    /// Target `/ping` on the application rooted at `main_url`.
    pub fn ping_of(main_url: &str) -> Self {
        Self(Arc::from(format!("{}/ping", main_url.trim_end_matches('/'))))
    }

    pub fn location(&self) -> &str {
        &self.0
    }
}

/// Middleware passing `/health` through and redirecting everything else.
pub async fn redirect_to_main(
    State(target): State<RedirectTarget>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    tracing::debug!(from = %request.uri(), to = %target.location(), "Redirecting to main application");

    (StatusCode::FOUND, [(LOCATION, target.location())]).into_response()
}
