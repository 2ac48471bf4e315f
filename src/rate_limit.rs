//! Soft global request pacing.

use std::time::Duration;

use tokio::time::sleep;

/// Pads each completed attempt up to a minimum interval.
///
/// Every worker throttles independently after its own request, so with many
/// workers the aggregate rate can exceed `requests_per_second`. This is a
/// pacing hint, not a token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    interval: Duration,
}

impl RateLimiter {
    /// Creates a limiter targeting `requests_per_second`. Non-positive or
    /// non-finite rates disable pacing.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Remaining wait: `max(0, interval - elapsed)`.
    pub fn delay_for(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }

    /// Sleeps for whatever is left of the interval after `elapsed`.
    pub async fn throttle(&self, elapsed: Duration) {
        let delay = self.delay_for(elapsed);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(100.0)
    }
}
