use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    BlockflowError, Result,
    common::Vars,
    error::BlockError,
    runtime::Context,
    workflow::actions::{Action, BlockType, parse_config},
};

use super::{
    config::AgentBlockConfig,
    output::{spread_fields, structure_output},
    tool_loop::{LoopOutcome, ToolLoop},
};

/// LLM inference with an embedded tool-calling loop.
#[derive(Debug, Clone)]
pub struct AgentAction {
    config: AgentBlockConfig,
}

impl AgentAction {
    pub fn config(&self) -> &AgentBlockConfig {
        &self.config
    }

    fn fold(
        &self,
        outcome: LoopOutcome,
    ) -> std::result::Result<Vars, BlockError> {
        let mut outputs = Vars::new();

        let mut response = Value::String(outcome.content.clone());
        if let Some(schema) = &self.config.output_schema {
            let structured = structure_output(&outcome.content, schema, self.config.strict_output)?;
            if let Some(data) = structured.data {
                for (key, value) in spread_fields(&data) {
                    outputs.insert(key, value);
                }
                response = data.clone();
                outputs.insert("data".to_string(), data);
            }
            if !structured.warnings.is_empty() {
                outputs.set("_schemaWarnings", &structured.warnings);
            }
        }

        outputs
            .set("response", response)
            .set("rawResponse", &outcome.content)
            .set("model", &outcome.model)
            .set(
                "tokens",
                json!({
                    "input": outcome.tokens.input,
                    "output": outcome.tokens.output,
                    "total": outcome.tokens.total(),
                }),
            )
            .set("toolCalls", &outcome.tool_calls)
            .set("iterations", outcome.iterations)
            .set("llmRetries", outcome.llm_retries);
        Ok(outputs)
    }
}

#[async_trait]
impl Action for AgentAction {
    fn create(params: Value) -> Result<Self> {
        let config: AgentBlockConfig = parse_config(params, &Self::schema())?;
        if let Some(schema) = &config.output_schema {
            jsonschema::validator_for(schema).map_err(|e| BlockflowError::Action(format!("invalid outputSchema: {e}")))?;
        }
        Ok(Self {
            config,
        })
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["model"],
            "properties": {
                "model": { "type": "string", "minLength": 1 },
                "temperature": { "type": ["number", "null"] },
                "systemPrompt": { "type": "string", "description": "Supports templates like {{block.path}}" },
                "userPrompt": { "type": "string", "description": "Supports templates like {{block.path}}" },
                "enabledTools": { "type": "array", "items": { "type": "string" } },
                "requiredTools": { "type": "array", "items": { "type": "string" } },
                "maxToolCalls": { "type": "integer", "minimum": 0 },
                "requireToolUsage": { "type": ["boolean", "null"] },
                "maxRetries": { "type": "integer", "minimum": 0 },
                "outputSchema": { "type": ["object", "null"] },
                "strictOutput": { "type": "boolean" },
                "maxIterations": { "type": ["integer", "null"], "minimum": 1 },
                "retryPolicy": { "type": ["object", "null"] }
            }
        })
    }

    fn block_type(&self) -> BlockType {
        BlockType::LlmInference
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        block_id: &str,
    ) -> std::result::Result<Vars, BlockError> {
        let llm = ctx.services().llm.clone().ok_or_else(|| BlockError::validation("no LLM client is configured"))?;

        let outcome = ToolLoop::new(&ctx, block_id, &self.config, llm).run().await?;
        tracing::debug!(
            block_id,
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls.len(),
            tokens = outcome.tokens.total(),
            "Agent finished"
        );
        self.fold(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        llm::{ChatResponse, TokenUsage},
        runtime::Services,
        testing::{ScriptedLlm, test_context, test_context_with},
    };

    fn services(llm: ScriptedLlm) -> Services {
        Services {
            llm: Some(Arc::new(llm)),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_validates_output_schema() {
        assert!(AgentAction::create(json!({"model": "m", "outputSchema": {"type": "object"}})).is_ok());
        assert!(AgentAction::create(json!({"model": "m", "outputSchema": {"type": 12}})).is_err());
        assert!(AgentAction::create(json!({"userPrompt": "hi"})).is_err());
    }

    #[tokio::test]
    async fn test_plain_answer_outputs() {
        let response = ChatResponse {
            content: "hello".to_string(),
            usage: TokenUsage {
                input: 10,
                output: 5,
            },
            ..Default::default()
        };
        let ctx = test_context_with(json!({}), services(ScriptedLlm::new(vec![Ok(response)])));
        let action = AgentAction::create(json!({"model": "m", "userPrompt": "say hi"})).unwrap();

        let outputs = action.run(ctx, "agent").await.unwrap();
        assert_eq!(outputs.get_value("response"), Some(&json!("hello")));
        assert_eq!(outputs.get_value("model"), Some(&json!("m")));
        assert_eq!(outputs.get_value("tokens"), Some(&json!({"input": 10, "output": 5, "total": 15})));
        assert_eq!(outputs.get_value("iterations"), Some(&json!(1)));
        assert_eq!(outputs.get_value("toolCalls"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_structured_answer_is_spread() {
        let llm = ScriptedLlm::new(vec![Ok(ChatResponse::text("```json\n{\"title\": \"Rust\", \"score\": \"9\"}\n```"))]);
        let ctx = test_context_with(json!({}), services(llm));
        let action = AgentAction::create(json!({
            "model": "m",
            "outputSchema": {"type": "object", "properties": {"title": {"type": "string"}, "score": {"type": "integer"}}}
        }))
        .unwrap();

        let outputs = action.run(ctx, "agent").await.unwrap();
        assert_eq!(outputs.get_value("title"), Some(&json!("Rust")));
        assert_eq!(outputs.get_value("score"), Some(&json!(9)));
        assert_eq!(outputs.get_value("data"), Some(&json!({"title": "Rust", "score": 9})));
        assert!(!outputs.contains_key("_schemaWarnings"));
    }

    #[tokio::test]
    async fn test_missing_client_is_validation_error() {
        let action = AgentAction::create(json!({"model": "m"})).unwrap();
        let err = action.run(test_context(json!({})), "agent").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
