//! Progress events emitted during an execution.
//!
//! Every block transition produces an [`ExecutionUpdate`]; each execution ends
//! with exactly one [`ExecutionComplete`]. Both travel wrapped in a [`Message`]
//! carrying a per-execution sequence number.

mod block;
mod execution;

pub use block::*;
pub use execution::*;

use serde::{Deserialize, Serialize};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Update(ExecutionUpdate),
    Complete(ExecutionComplete),
}

/// Envelope of a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub execution_id: String,
    /// Empty for execution-level events.
    pub block_id: String,
    /// Strictly increasing within one execution.
    pub seq: u64,
    pub event: ExecutionEvent,
}

impl Message {
    pub fn is_complete(&self) -> bool {
        matches!(self.event, ExecutionEvent::Complete(_))
    }

    /// A block failure, or an execution that did not complete cleanly.
    pub fn is_error(&self) -> bool {
        match &self.event {
            ExecutionEvent::Update(update) => update.status == UpdateStatus::Failed,
            ExecutionEvent::Complete(complete) => complete.status != crate::ExecutionStatus::Completed,
        }
    }
}

/// Log line emitted by a block while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub execution_id: String,
    pub block_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}
