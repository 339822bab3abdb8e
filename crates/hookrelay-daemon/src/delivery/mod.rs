//! Delivery loop: queue → rate limiter → connection.
//!
//! A single worker owns the consumer side of the queue. Partially delivered
//! messages go back to the front with their progress, so ordering holds
//! across reconnects.

pub mod lines;
pub mod rate;
pub mod sink;
pub mod worker;

pub use lines::protocol_lines;
pub use rate::RateLimiter;
pub use sink::LineSink;
pub use worker::{DeliveryStats, DeliveryStatsSnapshot, DeliveryWorker, MessageQueue, QueuedMessage};
