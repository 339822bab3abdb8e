//! The single delivery worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use hookrelay_core::config::DeliveryConfig;
use hookrelay_core::{BoundedQueue, OutboundMessage};

use super::lines::protocol_lines;
use super::rate::RateLimiter;
use super::sink::LineSink;
use crate::irc::SendError;

/// A message plus how far its delivery has progressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message: OutboundMessage,
    /// Protocol lines already written; a retry resumes after them.
    pub lines_sent: usize,
    /// Failed send attempts so far.
    pub attempts: u32,
}

impl From<OutboundMessage> for QueuedMessage {
    fn from(message: OutboundMessage) -> Self {
        Self {
            message,
            lines_sent: 0,
            attempts: 0,
        }
    }
}

pub type MessageQueue = BoundedQueue<QueuedMessage>;

/// Delivery counters shared with the health endpoint.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
    lines_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub retried: u64,
    pub lines_sent: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

enum Outcome {
    Delivered,
    Retry,
    Dropped,
    /// The sink is gone for good.
    Stop,
}

/// Drains the message queue into a [`LineSink`], one message at a time.
pub struct DeliveryWorker<S> {
    queue: Arc<MessageQueue>,
    sink: S,
    stats: Arc<DeliveryStats>,
    limiter: RateLimiter,
    max_retries: u32,
    max_line_bytes: usize,
}

impl<S: LineSink> DeliveryWorker<S> {
    pub fn new(
        queue: Arc<MessageQueue>,
        sink: S,
        stats: Arc<DeliveryStats>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            sink,
            stats,
            limiter: RateLimiter::new(config.burst, config.line_interval()),
            max_retries: config.max_retries,
            max_line_bytes: config.max_line_bytes,
        }
    }

    /// Run until the queue is closed and drained, or the sink closes.
    pub async fn run(mut self) {
        info!(max_retries = self.max_retries, "Delivery loop started");

        while let Ok(mut item) = self.queue.dequeue().await {
            // Waiting for the connection is not a delivery attempt.
            if self.sink.wait_ready().await.is_err() {
                self.queue.requeue_front(item);
                warn!("Connection closed, delivery loop stopping");
                return;
            }

            match self.deliver(&mut item).await {
                Outcome::Delivered => {
                    DeliveryStats::bump(&self.stats.delivered);
                    debug!(channel = %item.message.channel(), lines = item.lines_sent, "Message delivered");
                }
                Outcome::Retry => {
                    DeliveryStats::bump(&self.stats.retried);
                    self.queue.requeue_front(item);
                }
                Outcome::Dropped => DeliveryStats::bump(&self.stats.dropped),
                Outcome::Stop => {
                    self.queue.requeue_front(item);
                    warn!("Connection closed, delivery loop stopping");
                    return;
                }
            }
        }

        info!("Queue closed and drained, delivery loop stopping");
    }

    /// Send the remaining lines of `item`, updating its progress.
    async fn deliver(&mut self, item: &mut QueuedMessage) -> Outcome {
        let lines = protocol_lines(&item.message, self.max_line_bytes);

        while let Some(line) = lines.get(item.lines_sent) {
            self.limiter.acquire().await;
            match self.sink.send_line(line).await {
                Ok(()) => {
                    item.lines_sent += 1;
                    DeliveryStats::bump(&self.stats.lines_sent);
                }
                Err(SendError::Closed) => return Outcome::Stop,
                Err(e) if e.is_retryable() => {
                    item.attempts += 1;
                    if item.attempts > self.max_retries {
                        warn!(
                            error = %e,
                            attempts = item.attempts,
                            lines_sent = item.lines_sent,
                            lines_total = lines.len(),
                            "Retries exhausted, dropping message"
                        );
                        return Outcome::Dropped;
                    }
                    debug!(
                        error = %e,
                        attempt = item.attempts,
                        resume_at = item.lines_sent,
                        "Send failed, requeueing remainder"
                    );
                    return Outcome::Retry;
                }
                Err(e) => {
                    warn!(error = %e, line_index = item.lines_sent, "Unsendable line, dropping message");
                    return Outcome::Dropped;
                }
            }
        }

        Outcome::Delivered
    }
}
