//! Event receiver: authenticates and validates inbound webhook payloads.
//!
//! Successful validation is the only way to obtain an [`InboundEvent`].
//! Unsupported kinds and malformed payloads are rejected here, before
//! anything reaches the normalizer or the queue.

mod dedup;
mod payload;
mod signature;

pub use dedup::{Admission, DedupWindow};
pub use payload::{EventTypeHint, receive};
pub use signature::{SIGNATURE_PREFIX, SignatureError, sign_payload, verify_signature};

use tracing::debug;

use crate::config::ReceiverConfig;
use crate::event::InboundEvent;

/// Validation failures for inbound payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The event type (or action/ref type) is not one the relay forwards.
    #[error("unsupported event kind: {0}")]
    UnsupportedEventKind(String),

    /// A required field is missing or the payload is not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Stateful receiver: shared secret plus a recent-delivery window.
pub struct EventReceiver {
    secret: Option<String>,
    dedup: DedupWindow,
}

impl EventReceiver {
    pub fn new(secret: Option<String>, dedup_window: usize) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            dedup: DedupWindow::new(dedup_window),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::new(config.webhook_secret.clone(), config.dedup_window)
    }

    /// Whether requests must carry a valid signature.
    pub const fn requires_signature(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the request signature. A receiver without a secret accepts all.
    pub fn authenticate(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        match &self.secret {
            Some(secret) => verify_signature(secret.as_bytes(), body, signature),
            None => Ok(()),
        }
    }

    /// Validate a raw payload. See [`receive`].
    pub fn receive(&self, raw: &[u8], event_type: &str) -> Result<InboundEvent, ValidationError> {
        receive(raw, event_type)
    }

    /// Reserve a delivery id. A `New` id must later be passed to
    /// [`commit_delivery`](Self::commit_delivery) or
    /// [`forget_delivery`](Self::forget_delivery).
    pub fn admit_delivery(&self, delivery_id: &str) -> Admission {
        let admission = self.dedup.admit(delivery_id);
        if admission != Admission::New {
            debug!(delivery_id, ?admission, "Delivery id already known");
        }
        admission
    }

    /// The event behind a reserved id was queued.
    pub fn commit_delivery(&self, delivery_id: &str) {
        self.dedup.commit(delivery_id);
    }

    /// Release a reserved id for an event that was not queued.
    pub fn forget_delivery(&self, delivery_id: &str) {
        self.dedup.forget(delivery_id);
    }
}
