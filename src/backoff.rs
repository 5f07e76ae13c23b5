use std::time::Duration;

use rand::Rng;

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Delay to wait after the given attempt before starting the next one.
///
/// `1000ms * 2^attempt` plus a uniformly random jitter in `[0, 1000)` ms, so
/// concurrent callers that fail together do not retry in lockstep.
pub fn compute_delay(attempt: usize) -> Duration {
    ExponentialBackoff::default().delay_for_attempt(attempt)
}

pub trait BackoffSource: Send + Sync {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max_jitter: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_jitter: Duration) -> Self {
        Self { base, max_jitter }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    fn exponential_ms(&self, attempt: usize) -> u64 {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let base_ms = duration_ms(self.base);
        1_u64
            .checked_shl(exponent)
            .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
    }

    fn jitter_ms(&self) -> u64 {
        let max_jitter_ms = duration_ms(self.max_jitter);
        if max_jitter_ms == 0 {
            return 0;
        }
        rand::rng().random_range(0..max_jitter_ms)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF, DEFAULT_MAX_JITTER)
    }
}

impl BackoffSource for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms = self
            .exponential_ms(attempt)
            .saturating_add(self.jitter_ms());
        Duration::from_millis(delay_ms)
    }
}

/// Constant spacing between attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl BackoffSource for FixedBackoff {
    fn delay_for_attempt(&self, _attempt: usize) -> Duration {
        self.0
    }
}
