//! Retry policy engine.
//!
//! Decides whether a failed attempt is retried and how long to wait, and
//! guards retries with a per-execution circuit breaker.

mod breaker;
mod policy;

pub use breaker::CircuitBreaker;
pub use policy::{RetryCondition, RetryPolicy, base_delay, retry_with_policy, should_retry};
