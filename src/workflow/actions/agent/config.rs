use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retry::RetryPolicy;

fn default_max_tool_calls() -> u32 {
    15
}

fn default_max_retries() -> u32 {
    2
}

/// Config of an `llm_inference` block.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentBlockConfig {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    /// Defaults to whether any tool is configured.
    #[serde(default)]
    pub require_tool_usage: Option<bool>,
    /// Re-prompts allowed when the model skips a required tool.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub strict_output: bool,
    /// Ceiling on model round-trips, the engine default when unset.
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// Retries of transient model API failures, the engine default when unset.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

impl AgentBlockConfig {
    pub fn requires_tool_usage(&self) -> bool {
        self.require_tool_usage.unwrap_or(!self.enabled_tools.is_empty() || !self.required_tools.is_empty())
    }

    /// Tools the model may call: enabled ones plus required ones, without duplicates.
    pub fn allowed_tools(&self) -> Vec<String> {
        let mut tools = self.enabled_tools.clone();
        for name in self.required_tools.iter() {
            if !tools.contains(name) {
                tools.push(name.clone());
            }
        }
        tools
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: AgentBlockConfig = serde_json::from_value(json!({"model": "m"})).unwrap();
        assert_eq!(config.max_tool_calls, 15);
        assert_eq!(config.max_retries, 2);
        assert!(!config.requires_tool_usage());
        assert!(config.retry_policy.is_none());

        let config: AgentBlockConfig = serde_json::from_value(json!({
            "model": "m",
            "enabledTools": ["search", "fetch"],
            "requiredTools": ["search", "notify"]
        }))
        .unwrap();
        assert!(config.requires_tool_usage());
        assert_eq!(config.allowed_tools(), vec!["search", "fetch", "notify"]);
    }
}
