pub mod agent;
pub mod tool;
pub mod variable;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, common::Vars, error::BlockError, runtime::Context};

pub use agent::AgentAction;
pub use tool::ToolAction;
pub use variable::VariableAction;
pub use webhook::WebhookAction;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockType {
    LlmInference,
    ToolExecution,
    Webhook,
    Variable,
    CodeBlock,
}

#[async_trait]
pub trait Action: Send + Sync {
    /// Creates a new instance of the action from the given config.
    ///
    /// # Arguments
    ///
    /// * `params` - The [`serde_json::Value`] containing the block config.
    ///
    /// # Returns
    ///
    /// Returns a [`Result`] containing the created action instance.
    fn create(params: serde_json::Value) -> Result<Self>
    where
        Self: Sized;

    /// Returns the JSON schema the config must satisfy.
    fn schema() -> serde_json::Value
    where
        Self: Sized;

    fn block_type(&self) -> BlockType;

    /// Executes one attempt of the block.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the execution.
    /// * `block_id` - The id of the block.
    ///
    /// # Returns
    ///
    /// The block outputs, or a classified [`BlockError`] the retry engine acts on.
    async fn run(
        &self,
        ctx: Arc<Context>,
        block_id: &str,
    ) -> std::result::Result<Vars, BlockError>;
}

/// Validate `params` against `schema`, then deserialize it.
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    params: serde_json::Value,
    schema: &serde_json::Value,
) -> Result<T> {
    jsonschema::validate(schema, &params)?;
    Ok(serde_json::from_value::<T>(params)?)
}

/// Typed action of a block, one variant per block type.
#[derive(Debug, Clone)]
pub enum BlockAction {
    Variable(VariableAction),
    Webhook(WebhookAction),
    /// `tool_execution` and `code_block`
    Tool(ToolAction),
    Agent(AgentAction),
}

impl BlockAction {
    pub fn create(
        block_type: BlockType,
        params: serde_json::Value,
    ) -> Result<Self> {
        let action = match block_type {
            BlockType::Variable => BlockAction::Variable(VariableAction::create(params)?),
            BlockType::Webhook => BlockAction::Webhook(WebhookAction::create(params)?),
            BlockType::ToolExecution | BlockType::CodeBlock => BlockAction::Tool(ToolAction::create(params)?.with_type(block_type)),
            BlockType::LlmInference => BlockAction::Agent(AgentAction::create(params)?),
        };
        Ok(action)
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockAction::Variable(a) => a.block_type(),
            BlockAction::Webhook(a) => a.block_type(),
            BlockAction::Tool(a) => a.block_type(),
            BlockAction::Agent(a) => a.block_type(),
        }
    }

    pub async fn run(
        &self,
        ctx: Arc<Context>,
        block_id: &str,
    ) -> std::result::Result<Vars, BlockError> {
        match self {
            BlockAction::Variable(a) => a.run(ctx, block_id).await,
            BlockAction::Webhook(a) => a.run(ctx, block_id).await,
            BlockAction::Tool(a) => a.run(ctx, block_id).await,
            BlockAction::Agent(a) => a.run(ctx, block_id).await,
        }
    }
}
