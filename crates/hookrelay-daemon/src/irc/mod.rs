//! IRC connection manager.
//!
//! Keeps one authenticated connection to the configured server and channel,
//! re-establishing it with exponential backoff whenever it drops.

pub mod backoff;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod manager;
pub mod message;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use error::{ConnError, SendError};
pub use manager::{ConnectionHandle, ConnectionManager, ConnectionState, connect};
pub use transport::{BoxedStream, Connector, IrcStream, TcpConnector};
