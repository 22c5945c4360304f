use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    common::Vars,
    error::{BlockError, ErrorKind},
    utils,
    workflow::ValidationError,
};

/// Overall status of an execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    PartialFailure,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::PartialFailure)
    }
}

/// Status of one block inside an execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl BlockStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BlockStatus::Completed | BlockStatus::Failed | BlockStatus::Skipped)
    }

    /// Allowed moves: pending -> running | skipped, running -> completed | failed.
    pub fn can_transition_to(
        &self,
        next: BlockStatus,
    ) -> bool {
        matches!(
            (self, next),
            (BlockStatus::Pending, BlockStatus::Running)
                | (BlockStatus::Pending, BlockStatus::Skipped)
                | (BlockStatus::Running, BlockStatus::Completed)
                | (BlockStatus::Running, BlockStatus::Failed)
        )
    }
}

/// One attempt of a block, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// Zero-based attempt number.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    pub timestamp: i64,
    pub duration_ms: u64,
}

impl RetryAttempt {
    pub fn succeeded(
        attempt: u32,
        timestamp: i64,
        duration_ms: u64,
    ) -> Self {
        Self {
            attempt,
            error: None,
            error_type: None,
            timestamp,
            duration_ms,
        }
    }

    pub fn failed(
        attempt: u32,
        error: &BlockError,
        timestamp: i64,
        duration_ms: u64,
    ) -> Self {
        Self {
            attempt,
            error: Some(error.message.clone()),
            error_type: Some(error.kind),
            timestamp,
            duration_ms,
        }
    }
}

/// Runtime record of one block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    pub block_id: String,
    pub normalized_id: String,
    pub name: String,
    pub status: BlockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub retry_count: u32,
    #[serde(default)]
    pub retry_history: Vec<RetryAttempt>,
}

impl BlockState {
    pub fn new(
        block_id: &str,
        normalized_id: &str,
        name: &str,
    ) -> Self {
        Self {
            block_id: block_id.to_string(),
            normalized_id: normalized_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Move to `next`, stamping timestamps. Illegal moves are refused and logged.
    pub fn transition(
        &mut self,
        next: BlockStatus,
    ) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(block_id = %self.block_id, from = self.status.as_ref(), to = next.as_ref(), "Refused illegal block transition");
            return false;
        }
        let now = utils::time::time_millis();
        match next {
            BlockStatus::Running => self.started_at = Some(now),
            _ => self.completed_at = Some(now),
        }
        self.status = next;
        true
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Result of [`crate::Engine::execute`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub output: Vars,
    /// Keyed by block id.
    pub block_states: BTreeMap<String, BlockState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,
}

impl ExecutionResult {
    /// Result of an execution rejected before any block ran.
    pub fn rejected(
        execution_id: String,
        errors: Vec<ValidationError>,
    ) -> Self {
        let message = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        Self {
            execution_id,
            status: ExecutionStatus::Failed,
            error: Some(format!("workflow validation failed: {message}")),
            validation_errors: errors,
            ..Default::default()
        }
    }

    pub fn block(
        &self,
        block_id: &str,
    ) -> Option<&BlockState> {
        self.block_states.get(block_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_status_transitions() {
        let mut state = BlockState::new("a", "a", "A");
        assert!(state.transition(BlockStatus::Running));
        assert!(state.started_at.is_some());
        assert!(state.transition(BlockStatus::Completed));
        assert!(!state.transition(BlockStatus::Running));
        assert_eq!(state.status, BlockStatus::Completed);
    }

    #[test]
    fn test_skipped_only_from_pending() {
        assert!(BlockStatus::Pending.can_transition_to(BlockStatus::Skipped));
        assert!(!BlockStatus::Running.can_transition_to(BlockStatus::Skipped));
        assert!(!BlockStatus::Failed.can_transition_to(BlockStatus::Completed));
    }
}
