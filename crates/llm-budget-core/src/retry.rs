//! Bounded retry with a fixed delay between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::provider::ProviderError;

/// Errors that say whether trying again could help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Never less than 1.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 6;
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(20);

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Failed with an error that is not worth retrying.
    Permanent(E),
    /// Every attempt failed transiently; `last` is the final failure.
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent(e) | Self::Exhausted { last: e, .. } => e,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or has failed
/// `policy.max_attempts` times. Sleeps `policy.delay` between attempts.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                warn!(error = %err, "non-retryable error");
                return Err(RetryError::Permanent(err));
            }
            Err(err) if attempt >= max_attempts => {
                error!(attempts = attempt, error = %err, "all retry attempts exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                warn!(
                    attempt,
                    max_attempts,
                    delay_secs = policy.delay.as_secs_f64(),
                    error = %err,
                    "retrying after failure"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    fn flaky(failures: u32, kind: ProviderErrorKind) -> impl FnMut() -> std::future::Ready<Result<u32, ProviderError>> {
        let mut calls = 0;
        move || {
            calls += 1;
            std::future::ready(if calls <= failures {
                Err(ProviderError::new(kind, format!("failure {calls}")))
            } else {
                Ok(calls)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_attempt() {
        let started = tokio::time::Instant::now();
        let out = retry(&RetryPolicy::default(), flaky(5, ProviderErrorKind::RateLimited)).await;
        assert_eq!(out, Ok(6));
        // Five pauses between six attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let out = retry(&RetryPolicy::default(), flaky(6, ProviderErrorKind::ServerError)).await;
        match out {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 6);
                assert_eq!(last.message, "failure 6");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(6, Duration::ZERO);
        let out = retry(&policy, flaky(3, ProviderErrorKind::ClientError)).await;
        assert!(matches!(out, Err(RetryError::Permanent(ref e)) if e.message == "failure 1"));
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let out = retry(&RetryPolicy::none(), flaky(0, ProviderErrorKind::Timeout)).await;
        assert_eq!(out, Ok(1));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn into_inner_returns_last_error() {
        let e = ProviderError::new(ProviderErrorKind::Network, "x");
        let r: RetryError<ProviderError> = RetryError::Exhausted {
            attempts: 2,
            last: e.clone(),
        };
        assert_eq!(r.into_inner(), e);
    }
}
