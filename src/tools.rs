//! Tool registry consumed by tool blocks and the agent loop.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{BlockError, ErrorKind};

/// Description of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

/// Error raised by a tool. Without an explicit kind it counts as `server_error`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ToolError {
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// Minimum wait before the tool may be called again.
    pub retry_after: Option<Duration>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(
        mut self,
        retry_after: Duration,
    ) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_kind(
        mut self,
        kind: ErrorKind,
    ) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl From<ToolError> for BlockError {
    fn from(error: ToolError) -> Self {
        let mut err = BlockError::new(error.kind.unwrap_or(ErrorKind::ServerError), error.message);
        err.retry_after = error.retry_after;
        err
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments.
    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, ToolError>;
}

/// Named collection of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        tool: impl Tool + 'static,
    ) -> &mut Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for the named tools, skipping unknown names.
    pub fn definitions<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Vec<ToolDefinition> {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }
}
