use serde::{Deserialize, Serialize};

use crate::{
    BlockflowError, Result,
    model::{BlockModel, ConnectionModel, VariableModel},
};

/// Serializable workflow definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: u32,
    pub blocks: Vec<BlockModel>,
    #[serde(default)]
    pub connections: Vec<ConnectionModel>,
    #[serde(default)]
    pub variables: Vec<VariableModel>,
    /// Hard deadline for the whole execution, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_blocks: Option<usize>,
    /// Block whose result decides between `failed` and `partial_failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_block_id: Option<String>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowModel>(s).map_err(|e| BlockflowError::Workflow(format!("{}", e)))
    }
}
