use std::time::Duration;

use serde_json::Value;

use crate::{
    BlockflowError, Result,
    model::BlockModel,
    retry::RetryPolicy,
    workflow::actions::{BlockAction, BlockType},
};

/// block id
pub type BlockId = String;

/// Runtime block: the definition with its config parsed into a typed action.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub normalized_id: String,
    pub name: String,
    pub block_type: BlockType,
    /// Raw config, interpolated again before every run.
    pub config: Value,
    pub action: BlockAction,
    /// Per-attempt timeout; `None` uses the execution default.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Block {
    pub fn new(model: &BlockModel) -> Result<Self> {
        let block_type = model.kind.parse::<BlockType>().map_err(|_| BlockflowError::Block(format!("unknown block type '{}'", model.kind)))?;
        let config = match &model.config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let action = BlockAction::create(block_type, config.clone())?;

        if model.timeout == Some(0) {
            return Err(BlockflowError::Block("timeout must be greater than zero".to_string()));
        }

        Ok(Self {
            id: model.id.clone(),
            normalized_id: model.normalized_id(),
            name: model.display_name().to_string(),
            block_type,
            config,
            action,
            timeout: model.timeout.map(Duration::from_secs),
            retry: model.retry_config.as_ref().map(RetryPolicy::from).unwrap_or_else(RetryPolicy::none),
        })
    }
}
