use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{common::Vars, error::ErrorKind, model::BlockStatus};

/// Status carried by an [`ExecutionUpdate`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateStatus {
    Running,
    /// An attempt failed and another one is scheduled.
    Retrying,
    Completed,
    Failed,
    Skipped,
}

impl From<BlockStatus> for UpdateStatus {
    fn from(status: BlockStatus) -> Self {
        match status {
            BlockStatus::Pending | BlockStatus::Running => UpdateStatus::Running,
            BlockStatus::Completed => UpdateStatus::Completed,
            BlockStatus::Failed => UpdateStatus::Failed,
            BlockStatus::Skipped => UpdateStatus::Skipped,
        }
    }
}

/// One block transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    pub execution_id: String,
    pub block_id: String,
    pub status: UpdateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Zero-based attempt number for `running` and `retrying` updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl ExecutionUpdate {
    pub fn new(
        execution_id: &str,
        block_id: &str,
        status: UpdateStatus,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            block_id: block_id.to_string(),
            status,
            inputs: None,
            output: None,
            error: None,
            error_kind: None,
            attempt: None,
        }
    }
}
