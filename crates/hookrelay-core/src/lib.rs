//! hookrelay Core Library
//!
//! Shared functionality for the hookrelay daemon:
//! - Inbound event model and webhook payload validation
//! - Normalization of events into chat messages
//! - Bounded FIFO message queue with overflow policies
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod normalize;
pub mod queue;
pub mod receiver;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{EventKind, InboundEvent};
pub use message::OutboundMessage;
pub use normalize::Normalizer;
pub use queue::{BoundedQueue, OverflowPolicy, QueueClosed, QueueError, QueueStats};
pub use receiver::{Admission, EventReceiver, SignatureError, ValidationError};
