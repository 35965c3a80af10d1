use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// Retries immediately; meant for tests and dry environments.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, false)
    }

    /// Delay before the `retry`-th retry (0-based): `base * 2^retry`, capped at `max`.
    pub fn delay(&self, retry: u32) -> Duration {
        if !self.jitter {
            return self.exponential(retry);
        }
        let mut rng = rand::thread_rng();
        self.delay_with_rng(retry, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let exp = self.exponential(retry);
        if self.jitter && !exp.is_zero() {
            let ms = exp.as_millis().min(u128::from(u64::MAX)) as u64;
            Duration::from_millis(rng.gen_range(ms / 2..=ms))
        } else {
            exp
        }
    }

    fn exponential(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = retry.min(16);
        Duration::from_millis(base_ms.saturating_mul(1u64 << shift).min(max_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, false)
    }
}

/// Returned once every attempt allowed by a [`RetryPolicy`] has failed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct ExhaustedRetries<E> {
    pub attempts: u32,
    pub last: E,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Runs `op` until it succeeds or `max_attempts` calls have failed.
    ///
    /// `op` receives the 1-based attempt number and must build fresh request
    /// state on every call.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> Result<Retried<T>, ExhaustedRetries<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        retries: attempt - 1,
                    });
                }
                Err(last) if attempt >= self.max_attempts => {
                    return Err(ExhaustedRetries {
                        attempts: attempt,
                        last,
                    });
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(
                        "{label}: attempt {attempt}/{} failed: {err}; retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Backoff::default())
    }
}
