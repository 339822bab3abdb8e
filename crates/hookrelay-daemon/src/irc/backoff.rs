//! Reconnect backoff policy.

use std::time::Duration;

use rand::RngExt;

use hookrelay_core::config::ReconnectConfig;

/// Exponential backoff reconnection policy with multiplicative jitter.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failed attempt.
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.2 = +/-20%).
    pub jitter: f64,
    /// A session that stayed up this long resets the attempt counter.
    pub stable_after: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
            stable_after: Duration::from_secs(60),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
            multiplier: config.multiplier,
            jitter: config.jitter,
            ..Self::default()
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay for a given attempt number (0-indexed), without jitter.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// The delay for `attempt` with jitter applied, still capped at `max_delay`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let factor = if self.jitter > 0.0 {
            rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter))
        } else {
            1.0
        };
        self.apply_jitter(attempt, factor)
    }

    fn apply_jitter(&self, attempt: u32, factor: f64) -> Duration {
        self.delay_for_attempt(attempt)
            .mul_f64(factor.max(0.0))
            .min(self.max_delay)
    }
}
