//! Outbound line pacing.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket: `burst` lines may go out back to back, then one line per
/// `interval`.
///
/// Tracked as a single "theoretical arrival time" instead of a token count,
/// which gives the same schedule without a refill timer.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    next_at: Instant,
}

impl RateLimiter {
    /// A zero `interval` disables pacing. A zero `burst` is treated as one.
    pub fn new(burst: u32, interval: Duration) -> Self {
        Self {
            interval,
            burst: burst.max(1),
            next_at: Instant::now(),
        }
    }

    /// Wait until one more line may be sent.
    pub async fn acquire(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        let arrival = self.next_at.max(now);
        let allowance = self.interval.saturating_mul(self.burst - 1);
        if let Some(earliest) = arrival.checked_sub(allowance) {
            if earliest > now {
                tokio::time::sleep_until(earliest).await;
            }
        }
        self.next_at = arrival + self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_steady_rate() {
        let interval = Duration::from_millis(500);
        let mut limiter = RateLimiter::new(4, interval);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert_eq!(start.elapsed(), interval);
        limiter.acquire().await;
        assert_eq!(start.elapsed(), interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_the_bucket() {
        let interval = Duration::from_millis(500);
        let mut limiter = RateLimiter::new(2, interval);

        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let resumed = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(resumed.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_waits() {
        let mut limiter = RateLimiter::new(1, Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
