use std::time::Duration;

use storyflow_config::BackoffConfig;

/// Exponential backoff between transport retries: `base * factor^(n-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    factor: f64,
    max: Duration,
    max_tries: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, factor: f64, max: Duration, max_tries: u32) -> Self {
        Self {
            base,
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
            max: max.max(base),
            max_tries: max_tries.max(1),
        }
    }

    /// Total tries per quality attempt, including the first
    #[must_use]
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Delay before retry `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_ms),
            config.factor,
            Duration::from_millis(config.max_ms),
            config.max_tries,
        )
    }
}
