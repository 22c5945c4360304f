use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    error::BlockError,
    runtime::Context,
    workflow::{
        actions::{Action, BlockType, parse_config},
        template,
    },
};

/// Runs one registered tool. Serves both `tool_execution` and `code_block`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ToolAction {
    tool_name: String,
    /// Arguments passed to the tool, the execution input when absent.
    #[serde(default)]
    argument_mapping: Option<Value>,
    #[serde(skip, default = "default_block_type")]
    block_type: BlockType,
}

fn default_block_type() -> BlockType {
    BlockType::ToolExecution
}

impl ToolAction {
    pub(crate) fn with_type(
        mut self,
        block_type: BlockType,
    ) -> Self {
        self.block_type = block_type;
        self
    }
}

#[async_trait]
impl Action for ToolAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["toolName"],
            "properties": {
                "toolName": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Name of a tool in the registry"
                },
                "argumentMapping": {
                    "description": "Tool arguments, string values support templates like {{block.path}}"
                }
            }
        })
    }

    fn block_type(&self) -> BlockType {
        self.block_type
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        block_id: &str,
    ) -> std::result::Result<Vars, BlockError> {
        let tool = ctx
            .services()
            .tools
            .get(&self.tool_name)
            .ok_or_else(|| BlockError::validation(format!("tool '{}' is not registered", self.tool_name)))?;

        let arguments = self.argument_mapping.clone().unwrap_or_else(|| ctx.input().clone());
        tracing::debug!(block_id, tool = %self.tool_name, "Executing tool");

        let result = tool.execute(arguments).await?;

        let mut outputs = Vars::new();
        outputs
            .set("response", template::render(&result))
            .set("result", &result)
            .set("data", &result)
            .set("toolName", &self.tool_name)
            .set("raw", &result);
        Ok(outputs)
    }
}
