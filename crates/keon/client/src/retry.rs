//! Retry policy and the sequential retry loop.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use keon_types::{KeonError, KeonResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest single backoff wait a validated policy may ask for (one day).
pub const MAX_WAIT_SECS: f64 = 86_400.0;

/// Exponential backoff settings.
///
/// The wait after failed attempt `n` (1-based) is
/// `min(max_wait_secs, min_wait_secs * multiplier^(n-1))`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_wait")]
    pub min_wait_secs: f64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// Three attempts, waits of 1s then 2s, capped at 10s.
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_wait_secs: default_min_wait(),
            max_wait_secs: default_max_wait(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_wait() -> f64 {
    1.0
}

fn default_max_wait() -> f64 {
    10.0
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        min_wait_secs: f64,
        max_wait_secs: f64,
        multiplier: f64,
    ) -> KeonResult<Self> {
        let policy = Self {
            max_attempts,
            min_wait_secs,
            max_wait_secs,
            multiplier,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// A single attempt; failures surface unchanged.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Five attempts starting at 0.5s, capped at 30s.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            min_wait_secs: 0.5,
            max_wait_secs: 30.0,
            multiplier: 2.0,
        }
    }

    pub fn validate(&self) -> KeonResult<()> {
        if self.max_attempts < 1 {
            return Err(KeonError::Config("max_attempts must be at least 1".into()));
        }
        if !(self.min_wait_secs.is_finite()
            && self.max_wait_secs.is_finite()
            && self.multiplier.is_finite())
        {
            return Err(KeonError::Config("retry waits must be finite".into()));
        }
        if self.min_wait_secs < 0.0 || self.min_wait_secs > self.max_wait_secs {
            return Err(KeonError::Config(format!(
                "retry waits must satisfy 0 <= min ({}) <= max ({})",
                self.min_wait_secs, self.max_wait_secs
            )));
        }
        if self.max_wait_secs > MAX_WAIT_SECS {
            return Err(KeonError::Config(format!(
                "max_wait_secs must not exceed {MAX_WAIT_SECS}, got {}",
                self.max_wait_secs
            )));
        }
        if self.multiplier < 1.0 {
            return Err(KeonError::Config("multiplier must be at least 1".into()));
        }
        Ok(())
    }

    /// Wait before retrying after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        if self.min_wait_secs <= 0.0 {
            return Duration::ZERO;
        }
        let secs = (self.min_wait_secs * self.multiplier.powi(exponent)).min(self.max_wait_secs);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Whether a failure is worth another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Transport trouble is retryable; input and authority errors never are.
pub fn classify(err: &KeonError) -> FailureClass {
    match err {
        KeonError::Network { .. } | KeonError::RateLimit { .. } => FailureClass::Retryable,
        KeonError::Server { status, .. } if (500..600).contains(status) => FailureClass::Retryable,
        _ => FailureClass::Fatal,
    }
}

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock waits.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs one logical operation through a [`RetryPolicy`].
///
/// Attempts are strictly sequential. Both the attempt and the wait after it
/// race against the cancellation token when one is set.
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> Retrier<'a> {
    pub fn new(policy: &'a RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            policy,
            sleeper,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Call `attempt_fn` with attempt numbers 1, 2, ... until it succeeds,
    /// fails fatally, or the budget runs out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> KeonResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = KeonResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match self.guard(operation, attempt_fn(attempt)).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == FailureClass::Fatal {
                debug!(operation, attempt, code = %err.code(), "fatal failure, not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                if max_attempts == 1 {
                    return Err(err);
                }
                warn!(operation, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(KeonError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(
                operation,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, retrying"
            );
            self.guard(operation, async {
                self.sleeper.sleep(delay).await;
                Ok(())
            })
            .await?;

            attempt += 1;
        }
    }

    async fn guard<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = KeonResult<T>>,
    ) -> KeonResult<T> {
        let Some(token) = self.cancellation else {
            return fut.await;
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(KeonError::Cancelled(format!("{operation} cancelled"))),
            result = fut => result,
        }
    }
}
