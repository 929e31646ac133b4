//! Hoststream HTTP API
//!
//! HTTP layer for Hoststream, built with Axum.
//!
//! # Endpoints
//!
//! ## Streaming
//! - `GET /api/stream` - Server-Sent Events stream of host metrics
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use hoststream::api::{serve, AppState};
//! use hoststream::config::ServerConfig;
//! use hoststream::stream::{Hub, HubConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancellationToken::new();
//!     let (hub, _task) = Hub::spawn(HubConfig::default(), cancel.clone());
//!     serve(AppState::new(hub), &ServerConfig::default(), cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{routing::get, Router};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::stream::stream_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new().route("/stream", get(stream_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Bind the configured address and serve until `cancel` fires
pub async fn serve(
    state: AppState,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> ApiResult<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Hoststream listening on {}", addr);

    serve_listener(listener, state, cancel, config.shutdown_grace()).await
}

/// Serve on an already bound listener.
///
/// Once `cancel` fires no new connections are accepted and open ones get
/// `grace` to finish; whatever is still open after that is dropped.
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
    grace: Duration,
) -> ApiResult<()> {
    let router = build_router(state);

    let signal = cancel.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        result = &mut server => return flatten(result),
        _ = cancel.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => {
            flatten(result)?;
            tracing::info!("Hoststream shut down gracefully");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Connections still open after grace period, forcing shutdown"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> ApiResult<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ApiError::Io(e)),
        Err(e) => Err(ApiError::Internal(format!("Server task failed: {}", e))),
    }
}

/// Wait for SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Frame, Hub, HubConfig, HubHandle};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode, Version},
    };
    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, HubHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let (hub, _task) = Hub::spawn(HubConfig::default(), cancel.clone());
        let router = build_router(AppState::new(hub.clone()));
        (router, hub, cancel)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _hub, _cancel) = create_test_app();
        let response = app.oneshot(get_request("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _hub, _cancel) = create_test_app();
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["clients"], 0);
    }

    #[tokio::test]
    async fn test_health_ready_after_shutdown() {
        let (app, hub, _cancel) = create_test_app();
        let response = app.clone().oneshot(get_request("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        hub.shutdown().await;
        let response = app.oneshot(get_request("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stream_headers_and_frames() {
        let (app, hub, _cancel) = create_test_app();
        let response = app.oneshot(get_request("/api/stream")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers["x-accel-buffering"], "no");
        assert_eq!(hub.client_count(), 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(
            &first[..],
            b"event: connected\ndata: {\"message\":\"Connected\"}\n\n"
        );

        hub.broadcast(Frame::event("message", "{\"n\":1}"));
        let second = body.next().await.unwrap().unwrap();
        assert_eq!(&second[..], b"event: message\ndata: {\"n\":1}\n\n");

        // Client goes away
        drop(body);
        hub.unregister(uuid::Uuid::new_v4()).await;
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_ends_on_hub_shutdown() {
        let (app, hub, _cancel) = create_test_app();
        let response = app.oneshot(get_request("/api/stream")).await.unwrap();
        let mut body = response.into_body().into_data_stream();
        let _connected = body.next().await;

        hub.shutdown().await;
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_rejects_http10() {
        let (app, hub, _cancel) = create_test_app();
        let request = Request::builder()
            .uri("/api/stream")
            .version(Version::HTTP_10)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hub.client_count(), 0);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "STREAMING_UNSUPPORTED");
    }

    #[tokio::test]
    async fn test_stream_after_shutdown_is_unavailable() {
        let (app, hub, _cancel) = create_test_app();
        hub.shutdown().await;

        let response = app.oneshot(get_request("/api/stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_serve_drains_streams_on_cancel() {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = Hub::spawn(HubConfig::default(), cancel.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(serve_listener(
            listener,
            AppState::new(hub.clone()),
            cancel.clone(),
            Duration::from_secs(5),
        ));

        let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /api/stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !String::from_utf8_lossy(&received).contains("event: connected") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the connected frame");
            received.extend_from_slice(&buf[..n]);
        }
        let head = String::from_utf8_lossy(&received).to_lowercase();
        assert!(head.starts_with("http/1.1 200"));
        assert!(head.contains("content-type: text/event-stream"));
        assert_eq!(hub.client_count(), 1);

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(hub.client_count(), 0);
    }
}
