use std::{collections::HashMap, sync::Mutex};

use tracing::warn;

use crate::error::BlockError;

/// Counts consecutive failures per error source and refuses further retries
/// for a source once it reaches the threshold. Shared by all blocks of one execution.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    failures: Mutex<HashMap<&'static str, u32>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure. Returns `true` when the circuit for its source is now open.
    pub fn record_failure(
        &self,
        error: &BlockError,
    ) -> bool {
        if self.threshold == 0 {
            return false;
        }
        let Some(source) = error.source_key() else {
            return false;
        };
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(source).or_default();
        *count += 1;
        if *count == self.threshold {
            warn!(source, failures = *count, "Circuit breaker opened");
        }
        *count >= self.threshold
    }

    /// A success closes the circuit for that source.
    pub fn record_success(
        &self,
        source: Option<&'static str>,
    ) {
        if let Some(source) = source {
            self.failures.lock().unwrap_or_else(|e| e.into_inner()).remove(source);
        }
    }
}
