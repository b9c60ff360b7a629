//! Bounded retry with Fibonacci backoff and jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times an operation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// First delay of the Fibonacci sequence.
    pub base_delay: Duration,
    /// Each delay is moved by a uniform offset in `[-jitter, +jitter]`.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Policy for feeds prone to transient failures: 7 attempts, delays of
    /// 1s, 2s, 3s, 5s, 8s, 13s, each ±100ms.
    pub fn fibonacci() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(100),
        }
    }

    /// A single attempt. Failures are left to the next scheduled run.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay to wait after the `failures`-th failed attempt (1-based), before jitter.
    pub fn backoff(&self, failures: u32) -> Duration {
        let (mut a, mut b) = (0u32, 1u32);
        for _ in 0..failures {
            let next = a.saturating_add(b);
            a = b;
            b = next;
        }
        self.base_delay.saturating_mul(b)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let bound = self.jitter.as_millis() as i64;
        let offset = rand::thread_rng().gen_range(-bound..=bound);
        let millis = (delay.as_millis() as i64 + offset).max(0);
        Duration::from_millis(millis as u64)
    }
}

/// Terminal outcome of [`execute_with_retry`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error that no retry can fix.
    Permanent(E),
    /// Every attempt of the budget failed; `last` is the final error.
    Exhausted { attempts: u32, last: E },
}

/// Runs `op` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent. `op` receives the 1-based attempt number.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(RetryError::Permanent(e)),
            Err(e) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.jittered(policy.backoff(attempt));
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
