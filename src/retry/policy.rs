use std::{future::Future, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::warn;

use crate::{
    error::{BlockError, ErrorKind},
    model::{RetryAttempt, RetryConfig},
    utils,
};

/// Failure kinds a policy is willing to retry, as written in `retryOn`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryCondition {
    Timeout,
    RateLimit,
    ServerError,
    NetworkError,
    /// Matches every transient kind.
    AllTransient,
}

impl RetryCondition {
    pub fn matches(
        &self,
        kind: ErrorKind,
    ) -> bool {
        match self {
            RetryCondition::Timeout => kind == ErrorKind::Timeout,
            RetryCondition::RateLimit => kind == ErrorKind::RateLimit,
            RetryCondition::ServerError => kind == ErrorKind::ServerError,
            RetryCondition::NetworkError => kind == ErrorKind::NetworkError,
            RetryCondition::AllTransient => kind.is_transient(),
        }
    }
}

/// Exponential backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay: u64,
    /// Upper bound of the pre-jitter delay, in milliseconds.
    pub max_delay: u64,
    pub backoff_multiplier: f64,
    pub retry_on: Vec<RetryCondition>,
    pub jitter_percent: u32,
}

impl Default for RetryPolicy {
    /// Defaults used for transient LLM API failures.
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: 1000,
            max_delay: 30000,
            backoff_multiplier: 2.0,
            retry_on: vec![RetryCondition::Timeout, RetryCondition::RateLimit, RetryCondition::ServerError],
            jitter_percent: 20,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_on: Vec::new(),
            ..Self::default()
        }
    }

    pub fn retries(
        &self,
        kind: ErrorKind,
    ) -> bool {
        self.retry_on.iter().any(|c| c.matches(kind))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.backoff_ms,
            max_delay: config.max_backoff_ms,
            backoff_multiplier: 2.0,
            retry_on: config.retry_on.clone(),
            jitter_percent: 20,
        }
    }
}

/// Pre-jitter delay for `attempt`: `min(max_delay, initial_delay * multiplier^attempt)`.
pub fn base_delay(
    attempt: u32,
    policy: &RetryPolicy,
) -> Duration {
    let exp = policy.backoff_multiplier.max(1.0).powi(attempt.min(64) as i32);
    let millis = (policy.initial_delay as f64 * exp).min(policy.max_delay as f64);
    Duration::from_millis(millis.max(0.0) as u64)
}

fn jitter(
    delay: Duration,
    percent: u32,
) -> Duration {
    if percent == 0 || delay.is_zero() {
        return delay;
    }
    let spread = delay.as_millis() as f64 * (percent.min(100) as f64 / 100.0);
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((delay.as_millis() as f64 + offset).max(0.0) as u64)
}

/// Decide whether a failure on zero-based `attempt` is retried.
///
/// Returns the jittered delay to wait before the next attempt, or `None` when
/// the attempt budget is spent or `kind` is not covered by `retry_on`.
pub fn should_retry(
    attempt: u32,
    kind: ErrorKind,
    policy: &RetryPolicy,
) -> Option<Duration> {
    if attempt >= policy.max_retries || !policy.retries(kind) {
        return None;
    }
    Some(jitter(base_delay(attempt, policy), policy.jitter_percent))
}

/// Run `op` until it succeeds or the policy gives up.
///
/// Every attempt is recorded. The last error is returned verbatim.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> (std::result::Result<T, BlockError>, Vec<RetryAttempt>)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, BlockError>>,
{
    let mut attempts = Vec::new();
    let mut attempt = 0;
    loop {
        let timestamp = utils::time::time_millis();
        let started = Instant::now();
        match op(attempt).await {
            Ok(value) => {
                attempts.push(RetryAttempt::succeeded(attempt, timestamp, started.elapsed().as_millis() as u64));
                return (Ok(value), attempts);
            }
            Err(err) => {
                attempts.push(RetryAttempt::failed(attempt, &err, timestamp, started.elapsed().as_millis() as u64));
                let Some(delay) = should_retry(attempt, err.kind, policy) else {
                    return (Err(err), attempts);
                };
                let delay = err.retry_after.map_or(delay, |after| delay.max(after));
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
