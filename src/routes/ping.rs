//! Ping endpoint of the main application.
//!
//! Echoes a greeting, the server time, the requested URL and the request
//! headers. Useful to confirm that redirects from the health listener land
//! on the main server.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub greeting: String,
    pub date: DateTime<Utc>,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

pub async fn ping(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Json<PingResponse> {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    Json(PingResponse {
        greeting: state.greeting.to_string(),
        date: Utc::now(),
        url,
        headers: flatten_headers(&headers),
    })
}

/// Join repeated headers with ", " and drop values that are not valid UTF-8.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}
