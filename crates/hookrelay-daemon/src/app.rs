//! Wiring of the running relay: HTTP ingress, queue, delivery and connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hookrelay_core::{Config, EventReceiver, Normalizer};

use crate::delivery::{DeliveryStats, DeliveryWorker, MessageQueue};
use crate::irc::{self, ConnError, ConnectionHandle, ReconnectPolicy};
use crate::server::{self, AppState};

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] hookrelay_core::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Connection(#[from] ConnError),
}

/// A started relay. Dropping it without [`shutdown`](Self::shutdown) leaves
/// the tasks running until the runtime stops.
pub struct Relay {
    local_addr: SocketAddr,
    connection: ConnectionHandle,
    queue: Arc<MessageQueue>,
    stats: Arc<DeliveryStats>,
    delivery: JoinHandle<()>,
    http: JoinHandle<std::io::Result<()>>,
    http_shutdown: watch::Sender<bool>,
    shutdown_grace: Duration,
}

impl Relay {
    /// Validate `config`, bind the listener, then start every task.
    pub async fn start(config: &Config) -> Result<Self, StartupError> {
        config.validate()?;

        let addr = config.receiver.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartupError::Bind { addr, source })?;

        let connection = irc::connect(&config.irc, ReconnectPolicy::from(&config.reconnect))?;

        let queue = Arc::new(MessageQueue::new(
            config.queue.capacity,
            config.queue.overflow_policy,
        ));
        let stats = Arc::new(DeliveryStats::default());

        let worker = DeliveryWorker::new(
            Arc::clone(&queue),
            connection.clone(),
            Arc::clone(&stats),
            &config.delivery,
        );
        let delivery = tokio::spawn(worker.run());

        let state = AppState {
            receiver: Arc::new(EventReceiver::from_config(&config.receiver)),
            normalizer: Arc::new(Normalizer::new(config.irc.channel.clone())),
            queue: Arc::clone(&queue),
            connection: connection.state_receiver(),
            stats: Arc::clone(&stats),
        };
        let router = server::build_router(state, config.receiver.max_payload_bytes);
        let (http_shutdown, http_shutdown_rx) = watch::channel(false);
        let http = tokio::spawn(server::serve(listener, router, http_shutdown_rx));

        info!(
            listen = %local_addr,
            server = %config.irc.server,
            port = config.irc.port,
            tls = config.irc.tls,
            channel = %config.irc.channel,
            queue_capacity = config.queue.capacity,
            overflow_policy = ?config.queue.overflow_policy,
            "Relay started"
        );

        Ok(Self {
            local_addr,
            connection,
            queue,
            stats,
            delivery,
            http,
            http_shutdown,
            shutdown_grace: config.delivery.shutdown_grace(),
        })
    }

    /// Address the HTTP listener is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub const fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub const fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Stop HTTP, close the queue, give delivery a grace period, then QUIT.
    pub async fn shutdown(self) {
        self.http_shutdown.send_replace(true);
        match self.http.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "HTTP server ended with error"),
            Err(e) => warn!(error = %e, "HTTP server task failed"),
        }

        self.queue.close();
        let mut delivery = self.delivery;
        if tokio::time::timeout(self.shutdown_grace, &mut delivery)
            .await
            .is_err()
        {
            delivery.abort();
            warn!(
                grace_secs = self.shutdown_grace.as_secs(),
                undelivered = self.queue.len(),
                "Delivery did not drain in time, abandoning remaining messages"
            );
        }

        self.connection.close().await;

        let stats = self.stats.snapshot();
        info!(
            delivered = stats.delivered,
            dropped = stats.dropped + self.queue.dropped(),
            "Relay stopped"
        );
    }
}
