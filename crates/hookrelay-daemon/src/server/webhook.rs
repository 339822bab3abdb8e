//! `POST /webhook`

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use tracing::{debug, info, warn};

use hookrelay_core::{Admission, QueueError, ValidationError};

use super::{AppState, RequestId};
use crate::delivery::QueuedMessage;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Debug, Serialize)]
struct WebhookReply {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn reply(code: StatusCode, status: &'static str, detail: Option<String>) -> Response {
    (code, Json(WebhookReply { status, detail })).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Authenticate, validate, normalize and enqueue one webhook delivery.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(event_type) = header(&headers, EVENT_HEADER) else {
        warn!(request_id = %request_id, "Webhook without event header");
        return reply(
            StatusCode::BAD_REQUEST,
            "rejected",
            Some("missing X-GitHub-Event header".into()),
        );
    };

    if let Err(e) = state
        .receiver
        .authenticate(&body, header(&headers, SIGNATURE_HEADER))
    {
        warn!(request_id = %request_id, event = %event_type, error = %e, "Webhook signature rejected");
        return reply(StatusCode::UNAUTHORIZED, "unauthorized", Some(e.to_string()));
    }

    if event_type.eq_ignore_ascii_case("ping") {
        info!(request_id = %request_id, "Webhook ping received");
        return reply(StatusCode::OK, "pong", None);
    }

    let event = match state.receiver.receive(&body, event_type) {
        Ok(event) => event,
        Err(e @ ValidationError::UnsupportedEventKind(_)) => {
            debug!(request_id = %request_id, event = %event_type, "Ignoring unsupported event");
            return reply(StatusCode::OK, "ignored", Some(e.to_string()));
        }
        Err(e @ ValidationError::MalformedPayload(_)) => {
            warn!(request_id = %request_id, event = %event_type, error = %e, "Malformed webhook payload");
            return reply(StatusCode::BAD_REQUEST, "rejected", Some(e.to_string()));
        }
    };

    let delivery_id = header(&headers, DELIVERY_HEADER);
    if let Some(id) = delivery_id {
        match state.receiver.admit_delivery(id) {
            Admission::New => {}
            Admission::Duplicate => {
                info!(request_id = %request_id, delivery_id = %id, "Duplicate delivery ignored");
                return reply(StatusCode::OK, "duplicate", None);
            }
            // The outcome is not known yet; have the sender try again.
            Admission::InFlight => {
                info!(request_id = %request_id, delivery_id = %id, "Same delivery already in progress");
                return reply(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    Some("delivery in progress".into()),
                );
            }
        }
    }

    let message = state.normalizer.normalize(&event);
    let lines = message.line_count();
    match state.queue.enqueue(QueuedMessage::from(message)) {
        Ok(()) => {
            if let Some(id) = delivery_id {
                state.receiver.commit_delivery(id);
            }
            info!(
                request_id = %request_id,
                kind = %event.kind(),
                repository = %event.repository(),
                lines,
                queue_len = state.queue.len(),
                "Event queued"
            );
            reply(StatusCode::ACCEPTED, "queued", None)
        }
        Err(e) => {
            if let Some(id) = delivery_id {
                state.receiver.forget_delivery(id);
            }
            let detail = match e {
                QueueError::Full => "queue is full",
                QueueError::Closed => "shutting down",
            };
            warn!(request_id = %request_id, kind = %event.kind(), error = %e, "Event not queued");
            reply(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                Some(detail.into()),
            )
        }
    }
}
