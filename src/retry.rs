//! Bounded retry loops with jittered delay.
//!
//! Every network call that may be retried goes through [`RetryPolicy::run`]
//! so the number of attempts per run is explicit and auditable. Nothing here
//! touches persisted state.

use rand::Rng;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly per attempt.
    pub base_delay: Duration,
    /// Upper bound of the random delay added before each retry.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retry.
    pub const fn once() -> Self {
        RetryPolicy {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Radar listing and frame downloads: one quick re-attempt.
    pub const fn radar_default() -> Self {
        RetryPolicy {
            attempts: 2,
            base_delay: Duration::ZERO,
            max_jitter: Duration::from_millis(250),
        }
    }

    /// Notification delivery.
    pub const fn notify_default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(500),
        }
    }

    /// Runs `op` until it succeeds, the attempt budget is spent, or
    /// `retryable` rejects the error. Returns the last error on failure.
    pub fn run<T, E, F, R>(&self, label: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && retryable(&err) => {
                    let delay = self.delay_before(attempt + 1);
                    debug!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt.saturating_sub(1));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        linear + jitter
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
