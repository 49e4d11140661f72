//! Exponential backoff with symmetric jitter.

use rand::Rng;
use std::time::Duration;

/// Fraction of the capped delay used as the jitter range on either side.
const JITTER_FRACTION: f64 = 0.25;

/// Delay policy for retry sweeps.
///
/// `delay(attempt) = min(base * 2^attempt, max) ± 25%`, then clamped to
/// `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(3600),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay for `attempt` (0-based) with a fresh random draw.
    pub fn delay(&self, attempt: u32) -> Duration {
        let draw = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_draw(attempt, draw)
    }

    /// Delay for `attempt` with a fixed jitter draw in `[-1.0, 1.0]`.
    ///
    /// `-1.0` yields the lower bound (-25%), `1.0` the upper bound (+25%).
    pub fn delay_with_draw(&self, attempt: u32, draw: f64) -> Duration {
        let capped = self.capped_secs(attempt);
        let jitter = capped * JITTER_FRACTION * draw.clamp(-1.0, 1.0);
        let jittered = (capped + jitter).min(self.max.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(jittered)
    }

    fn capped_secs(&self, attempt: u32) -> f64 {
        let exponential = self.base.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
        exponential.min(self.max.as_secs_f64())
    }
}
