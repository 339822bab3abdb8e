//! hookrelay Daemon Library
//!
//! Runtime pieces of the relay:
//! - IRC connection manager with reconnect and backoff
//! - Delivery loop from the message queue to the connection
//! - HTTP ingress for webhooks and health checks

pub mod app;
pub mod delivery;
pub mod irc;
pub mod server;

pub use app::{Relay, StartupError};
