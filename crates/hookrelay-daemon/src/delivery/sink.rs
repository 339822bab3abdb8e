//! Where the delivery loop writes protocol lines.

use std::sync::Arc;

use async_trait::async_trait;

use crate::irc::{ConnectionHandle, SendError};

/// Destination for protocol lines.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Write one protocol line; see [`ConnectionHandle::send`].
    async fn send_line(&self, line: &str) -> Result<(), SendError>;

    /// Resolve once lines can be sent; `Err` means never again.
    async fn wait_ready(&self) -> Result<(), SendError>;
}

#[async_trait]
impl LineSink for ConnectionHandle {
    async fn send_line(&self, line: &str) -> Result<(), SendError> {
        Self::send(self, line).await
    }

    async fn wait_ready(&self) -> Result<(), SendError> {
        Self::wait_ready(self).await
    }
}

#[async_trait]
impl<T: LineSink + ?Sized> LineSink for Arc<T> {
    async fn send_line(&self, line: &str) -> Result<(), SendError> {
        (**self).send_line(line).await
    }

    async fn wait_ready(&self) -> Result<(), SendError> {
        (**self).wait_ready().await
    }
}
