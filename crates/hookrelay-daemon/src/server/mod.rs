//! HTTP ingress: webhook endpoint and health check.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation (`X-Request-Id` on every response)
//! 2. Request/response tracing
//! 3. Body size limit
//! 4. Handler execution

pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use hookrelay_core::{EventReceiver, Normalizer};

use crate::delivery::{DeliveryStats, MessageQueue};
use crate::irc::ConnectionState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub receiver: Arc<EventReceiver>,
    pub normalizer: Arc<Normalizer>,
    pub queue: Arc<MessageQueue>,
    pub connection: watch::Receiver<ConnectionState>,
    pub stats: Arc<DeliveryStats>,
}

/// Per-request id, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, max_payload_bytes: usize) -> Router {
    Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/health", get(health::health))
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Serve until `shutdown` flips to `true`, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // A dropped sender also means shutdown.
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
