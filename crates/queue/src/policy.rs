use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed unit of work gets another attempt.
///
/// `should_retry` is only consulted after a failure and receives the number
/// of attempts made so far (1 after the first failure). An optional
/// exponential backoff spaces out the attempts of one unit; the queue stays
/// blocked on that unit while it waits.
#[derive(Clone)]
pub struct RetryPolicy {
    decide: Arc<dyn Fn(u32) -> bool + Send + Sync>,
    backoff: Option<(Duration, Duration)>,
}

impl RetryPolicy {
    /// Single attempt; failures are abandoned right away.
    pub fn never() -> Self { Self::from_fn(|_| false) }

    /// At most `max_attempts` attempts in total (`0` and `1` both mean a single attempt).
    pub fn limit(max_attempts: u32) -> Self { Self::from_fn(move |attempt| attempt < max_attempts) }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> bool + Send + Sync + 'static,
    {
        Self { decide: Arc::new(f), backoff: None }
    }

    /// Wait `base * 2^(attempt-1)` (capped at `max`) before each retry.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff = if base.is_zero() { None } else { Some((base, max.max(base))) };
        self
    }

    pub fn should_retry(&self, attempt: u32) -> bool { (self.decide)(attempt) }

    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            None => Duration::ZERO,
            Some((base, max)) => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::never() }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").field("backoff", &self.backoff).finish_non_exhaustive()
    }
}
