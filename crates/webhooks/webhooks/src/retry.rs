//! Retry strategies for webhook delivery.

use rand::Rng;
use std::time::Duration;

/// Highest exponent applied to the base delay.
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Computes the delay before retry number `attempt` using the thread RNG.
///
/// See [`compute_backoff_with`].
pub fn compute_backoff(attempt: u32, base: Duration, jitter_fraction: f64) -> Duration {
    compute_backoff_with(attempt, base, jitter_fraction, &mut rand::thread_rng())
}

/// Computes an exponential delay with additive jitter.
///
/// The exponent is clamped to [`MAX_BACKOFF_EXPONENT`], so the result is
/// always within `[base * 2^n, base * 2^n * (1 + jitter_fraction))` where
/// `n = min(attempt, 10)`. `jitter_fraction` is clamped to `0.0..=1.0`.
pub fn compute_backoff_with<R: Rng + ?Sized>(
    attempt: u32,
    base: Duration,
    jitter_fraction: f64,
    rng: &mut R,
) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    let backoff = base.saturating_mul(1_u32 << exponent);

    let jitter = jitter_fraction.clamp(0.0, 1.0);
    if jitter == 0.0 {
        return backoff;
    }

    let draw: f64 = rng.gen_range(0.0..1.0);
    let extra = Duration::try_from_secs_f64(backoff.as_secs_f64() * jitter * draw)
        .unwrap_or(Duration::MAX);
    backoff.saturating_add(extra)
}

/// Trait for retry strategies.
pub trait RetryStrategy: Send + Sync {
    /// Returns the delay to wait after `attempts` failed attempts, or `None`
    /// once no attempts are left.
    fn next_delay(&self, attempts: u32) -> Option<Duration>;

    /// Returns the maximum number of attempts.
    fn max_attempts(&self) -> u32;

    /// Checks if another attempt should be made.
    fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }
}

/// Exponential backoff retry strategy.
///
/// Delay after the n-th failed attempt is `base * 2^(n-1)` plus jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay.
    pub base: Duration,
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff strategy.
    pub fn new() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_attempts: 3,
            jitter: 0.5,
        }
    }

    /// Sets the base delay.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sets the maximum attempts.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Sets the jitter factor.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts == 0 || !self.should_retry(attempts) {
            return None;
        }

        Some(compute_backoff(attempts - 1, self.base, self.jitter))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
