// Retry logic with exponential backoff
//
// The schedule is a pure function of the attempt index so the bound and the
// delays can be tested without a network.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::ClientError;

/// Why a single attempt failed
#[derive(Debug)]
pub enum AttemptError {
    /// Connection refused, timeout, 5xx, broken stream
    Transport(String),
    /// The endpoint answered but the body was empty or malformed
    Invalid(String),
    /// Retrying cannot help (missing model, 4xx)
    Fatal(ClientError),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AttemptError::Fatal(_))
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Un-jittered delay after the given zero-based attempt: `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor)).min(self.max_delay)
    }

    /// Sleep before the next attempt
    pub async fn pause(&self, attempt: u32) {
        let delay = jittered(self.delay_for(attempt), &mut rand::thread_rng());
        tracing::warn!(
            "Request failed (attempt {}/{}), retrying in {:?}",
            attempt + 1,
            self.max_attempts,
            delay
        );
        sleep(delay).await;
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget is spent.
    ///
    /// Returns the last attempt error on exhaustion.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, AttemptError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::debug!("Attempt {} failed: {:?}", attempt + 1, e);
                    last_error = Some(e);
                    if attempt + 1 < self.max_attempts {
                        self.pause(attempt).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AttemptError::Transport("no attempts made".into())))
    }
}

/// Scale a delay into `[delay/2, delay]`
pub fn jittered<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    delay.mul_f64(rng.gen_range(0.5..=1.0))
}
