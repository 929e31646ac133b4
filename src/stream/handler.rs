//! Event-Stream Handler
//!
//! Handles `GET /api/stream`: checks that the connection can carry an
//! incrementally flushed body, registers the client and returns the
//! session as a streaming response.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Version},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::session::Session;
use crate::api::{ApiError, ApiResult, AppState};

/// Disables response buffering in nginx-style proxies
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Stream entry point
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    version: Version,
) -> ApiResult<Response> {
    if !supports_incremental_flush(version) {
        return Err(ApiError::StreamingUnsupported(version));
    }

    let subscription = state.hub.register().await?;
    let session = Session::new(state.hub.clone(), subscription);

    let mut response = Body::from_stream(session).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    // Connection-specific headers are not allowed on HTTP/2
    if version == Version::HTTP_11 {
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    }

    Ok(response)
}

/// Whether a body can be flushed frame by frame on this protocol version.
///
/// HTTP/1.0 and earlier have no chunked transfer encoding.
pub fn supports_incremental_flush(version: Version) -> bool {
    matches!(version, Version::HTTP_11 | Version::HTTP_2 | Version::HTTP_3)
}
