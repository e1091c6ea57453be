//! HTTP route handlers for both listeners.
//!
//! The main application serves `/ping` and the health endpoints. The health
//! sub-application serves `/health` only; its redirect middleware sends every
//! other request to the main application's `/ping`.
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod health;
pub mod ping;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::health::HealthReporter;
use crate::http::redirect::{redirect_to_main, RedirectTarget};
use crate::middleware::{request_id_layer, AppName};
use crate::state::AppState;

use self::health::{HEALTH_PATH, LIVE_PATH, READY_PATH};

/// Creates the main application's router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping::ping))
        .route(HEALTH_PATH, get(health::health))
        .route(LIVE_PATH, get(health::live))
        .route(READY_PATH, get(health::ready))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn_with_state(AppName("main"), request_id_layer))
}

/// Creates the health sub-application's router.
pub fn create_health_router(reporter: HealthReporter, target: RedirectTarget) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health::health))
        .fallback(|| async { axum::http::StatusCode::NOT_FOUND })
        .with_state(reporter)
        // Short-circuits everything but /health before routing
        .layer(middleware::from_fn_with_state(target, redirect_to_main))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(AppName("health"), request_id_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::health::{Readiness, ReadinessCheck, UptimeCheck};
    use crate::registry::{Binding, BindingValue, Registry, LIVE_CHECK, READY_CHECK};

    fn reporter(readiness: &Readiness) -> HealthReporter {
        let mut registry = Registry::new();
        registry.add(
            Binding::new("health.checks.uptime", BindingValue::HealthCheck(Arc::new(UptimeCheck::new())))
                .tag(LIVE_CHECK),
        );
        registry.add(
            Binding::new(
                "health.checks.main-listener",
                BindingValue::HealthCheck(Arc::new(ReadinessCheck::new(readiness.clone()))),
            )
            .tag(READY_CHECK),
        );
        HealthReporter::from_registry("test", &registry)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let readiness = Readiness::new();
        let app = create_router(AppState::new(reporter(&readiness), "Hello"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ping?x=1")
                    .header("x-custom", "yes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["greeting"], "Hello");
        assert_eq!(body["url"], "/ping?x=1");
        assert_eq!(body["headers"]["x-custom"], "yes");
        assert!(body["date"].is_string());
    }

    #[tokio::test]
    async fn test_main_health_endpoints_follow_readiness() {
        let readiness = Readiness::new();
        let app = create_router(AppState::new(reporter(&readiness), "Hello"));

        let response = app.clone().oneshot(get_request("/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.set_ready();
        let response = app.clone().oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "UP");
        assert_eq!(body["checks"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_health_router_serves_health_locally() {
        let readiness = Readiness::new();
        readiness.set_ready();
        let app = create_health_router(
            reporter(&readiness),
            RedirectTarget::ping_of("https://127.0.0.1:3000"),
        );

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert_eq!(body_json(response).await["status"], "UP");
    }

    #[tokio::test]
    async fn test_health_router_redirects_everything_else() {
        let readiness = Readiness::new();
        let app = create_health_router(
            reporter(&readiness),
            RedirectTarget::ping_of("https://127.0.0.1:3000"),
        );

        for uri in ["/", "/foo", "/ping", "/live", "/ready", "/health/", "/healthz?x=1"] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FOUND, "{}", uri);
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "https://127.0.0.1:3000/ping",
                "{}",
                uri
            );
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/foo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_health_router_reports_down_without_redirect() {
        let readiness = Readiness::new();
        let app = create_health_router(
            reporter(&readiness),
            RedirectTarget::ping_of("https://127.0.0.1:3000"),
        );

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::LOCATION).is_none());
    }
}
