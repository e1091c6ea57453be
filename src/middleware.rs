//! Request ID middleware for correlating logs with requests.
//!
//! Generates a UUID v4 for each incoming request and creates a tracing span
//! that wraps the entire request lifecycle. Both listeners install it, with
//! the span's `app` field telling them apart.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Extension type for accessing request ID in handlers if needed.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Name of the application serving a request, recorded on its span.
#[derive(Clone, Copy, Debug)]
pub struct AppName(pub &'static str);

/// Middleware that generates a request ID and creates a request span.
///
/// This should be the outermost middleware layer so the span wraps
/// all request processing, including redirects.
pub async fn request_id_layer(
    State(AppName(app)): State<AppName>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        "request",
        app,
        request_id = %request_id,
        method = %method,
        path = %path,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    request.extensions_mut().insert(RequestId(request_id));

    async move {
        let response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}
