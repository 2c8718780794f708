use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use super::api::{ApiError, SharedState};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";

pub(crate) fn normalized_header_value(headers: &HeaderMap, key: &str, max_len: usize) -> Option<String> {
    let raw = headers.get(key)?.to_str().ok()?.trim();
    if raw.is_empty() || raw.len() > max_len {
        return None;
    }
    Some(raw.to_string())
}

/// Opens an `http.request` span per request and echoes the request id back
/// in `x-request-id`, minting a v4 uuid when the client sent none.
pub(crate) async fn request_tracing_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = normalized_header_value(request.headers(), REQUEST_ID_HEADER, 128)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = request.method().to_string();
    let route = request.uri().path().to_string();

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    tracing::info!(
        parent: &span,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn is_protected(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/") || path == "/ws"
}

/// Browsers cannot set headers on a WebSocket handshake, so `/ws` also
/// accepts the key as `?api_key=`.
fn query_api_key(uri: &Uri) -> Option<String> {
    if uri.path() != "/ws" {
        return None;
    }
    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("api_key="))
        .filter(|k| !k.is_empty())
        .map(String::from)
}

/// Rejects `/api` and `/ws` requests without a configured key. With no keys
/// configured everything passes. The public intake routes are never gated.
pub(crate) async fn api_key_middleware(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() || !is_protected(request.uri().path()) {
        return next.run(request).await;
    }
    let key = normalized_header_value(request.headers(), API_KEY_HEADER, 256)
        .or_else(|| query_api_key(request.uri()));
    match key {
        Some(key) if state.api_keys.iter().any(|k| *k == key) => next.run(request).await,
        Some(_) => {
            tracing::warn!(route = %request.uri().path(), "Rejected request with invalid api key");
            ApiError::Unauthorized("invalid api key".into()).into_response()
        }
        None => {
            tracing::warn!(route = %request.uri().path(), "Rejected request without api key");
            ApiError::Unauthorized("api key required".into()).into_response()
        }
    }
}
