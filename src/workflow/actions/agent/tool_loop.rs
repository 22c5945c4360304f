//! The conversation loop of an agent block.
//!
//! ```text
//! Drafting --tool calls--> ToolCall --results--> Drafting
//! Drafting --answer--> Validating --ok--> Done
//!                      Validating --required tool missing--> Drafting (re-prompt)
//! ```

use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    error::{BlockError, ErrorKind},
    llm::{ChatMessage, ChatRequest, LlmClient, TokenUsage, ToolCall},
    retry::{RetryPolicy, retry_with_policy},
    runtime::Context,
    tools::ToolDefinition,
    workflow::{actions::agent::AgentBlockConfig, template},
};

/// One tool invocation made on behalf of the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Everything the loop produced up to the final answer.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub content: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: u32,
    pub llm_retries: u32,
}

enum Phase {
    Drafting,
    ToolCall(Vec<ToolCall>),
    Validating(String),
}

pub(crate) struct ToolLoop<'a> {
    ctx: &'a Context,
    block_id: &'a str,
    config: &'a AgentBlockConfig,
    llm: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    max_iterations: u32,
    allowed: Vec<String>,
    definitions: Vec<ToolDefinition>,
}

impl<'a> ToolLoop<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        block_id: &'a str,
        config: &'a AgentBlockConfig,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let allowed = config.allowed_tools();
        let definitions = ctx.services().tools.definitions(&allowed);
        Self {
            ctx,
            block_id,
            config,
            llm,
            policy: config.retry_policy.clone().unwrap_or_else(|| ctx.limits().llm_retry.clone()),
            max_iterations: config.max_iterations.filter(|n| *n > 0).unwrap_or(ctx.limits().max_agent_iterations),
            allowed,
            definitions,
        }
    }

    pub(crate) async fn run(self) -> Result<LoopOutcome, BlockError> {
        let mut messages = Vec::new();
        if !self.config.system_prompt.is_empty() {
            messages.push(ChatMessage::system(&self.config.system_prompt));
        }
        messages.push(ChatMessage::user(&self.config.user_prompt));

        let mut outcome = LoopOutcome {
            content: String::new(),
            model: self.config.model.clone(),
            tokens: TokenUsage::default(),
            tool_calls: Vec::new(),
            iterations: 0,
            llm_retries: 0,
        };
        let mut reprompts = 0;
        let mut phase = Phase::Drafting;

        loop {
            phase = match phase {
                Phase::Drafting => {
                    if outcome.iterations >= self.max_iterations {
                        return Err(BlockError::new(
                            ErrorKind::ToolCallLimitExceeded,
                            format!("agent did not finish within {} iterations", self.max_iterations),
                        ));
                    }
                    outcome.iterations += 1;

                    let request = ChatRequest {
                        model: self.config.model.clone(),
                        temperature: self.config.temperature,
                        messages: messages.clone(),
                        tools: self.definitions.clone(),
                    };
                    let (response, attempts) = retry_with_policy(&self.policy, |_| {
                        let llm = self.llm.clone();
                        let request = request.clone();
                        async move { llm.chat(request).await }
                    })
                    .await;
                    outcome.llm_retries += attempts.len().saturating_sub(1) as u32;
                    let response = response?;

                    outcome.tokens.add(response.usage);
                    if let Some(model) = response.model {
                        outcome.model = model;
                    }
                    if response.tool_calls.is_empty() {
                        Phase::Validating(response.content)
                    } else {
                        messages.push(ChatMessage::assistant_tool_calls(response.content, response.tool_calls.clone()));
                        Phase::ToolCall(response.tool_calls)
                    }
                }
                Phase::ToolCall(calls) => {
                    for call in calls {
                        if outcome.tool_calls.len() >= self.config.max_tool_calls as usize {
                            return Err(BlockError::new(
                                ErrorKind::ToolCallLimitExceeded,
                                format!("agent exceeded the limit of {} tool calls", self.config.max_tool_calls),
                            ));
                        }
                        let record = self.call_tool(&call).await;
                        let reply = match (&record.result, &record.error) {
                            (_, Some(error)) => format!("error: {error}"),
                            (Some(result), None) => template::render(result),
                            (None, None) => String::new(),
                        };
                        messages.push(ChatMessage::tool_result(&call.id, reply));
                        outcome.tool_calls.push(record);
                    }
                    Phase::Drafting
                }
                Phase::Validating(content) => {
                    let missing = self.missing_tools(&outcome.tool_calls);
                    if missing.is_empty() {
                        outcome.content = content;
                        return Ok(outcome);
                    }
                    if reprompts >= self.config.max_retries {
                        return Err(BlockError::new(
                            ErrorKind::MissingRequiredTool,
                            format!("agent finished without calling required tools: {}", missing.join(", ")),
                        ));
                    }
                    reprompts += 1;
                    self.ctx.emit_log(self.block_id, format!("required tools not called ({}), re-prompting {}/{}", missing.join(", "), reprompts, self.config.max_retries));
                    messages.push(ChatMessage::assistant(content));
                    messages.push(ChatMessage::user(format!(
                        "You must call the following tools before giving your final answer: {}. Call them now.",
                        missing.join(", ")
                    )));
                    Phase::Drafting
                }
            };
        }
    }

    async fn call_tool(
        &self,
        call: &ToolCall,
    ) -> ToolCallRecord {
        let started = Instant::now();
        let mut record = ToolCallRecord {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: None,
            error: None,
            duration_ms: 0,
        };

        let tool = if self.allowed.contains(&call.name) {
            self.ctx.services().tools.get(&call.name)
        } else {
            None
        };
        match tool {
            None if !self.allowed.contains(&call.name) => record.error = Some(format!("tool '{}' is not enabled for this block", call.name)),
            None => record.error = Some(format!("tool '{}' is not registered", call.name)),
            Some(tool) => match tool.execute(call.arguments.clone()).await {
                Ok(result) => record.result = Some(result),
                Err(err) => record.error = Some(err.message),
            },
        }
        record.duration_ms = started.elapsed().as_millis() as u64;

        match &record.error {
            Some(error) => self.ctx.emit_log(self.block_id, format!("tool '{}' failed: {}", call.name, error)),
            None => self.ctx.emit_log(self.block_id, format!("tool '{}' completed in {}ms", call.name, record.duration_ms)),
        }
        record
    }

    /// Required tools not yet called. Empty when enforcement is off or satisfied.
    fn missing_tools(
        &self,
        records: &[ToolCallRecord],
    ) -> Vec<String> {
        if !self.config.requires_tool_usage() {
            return Vec::new();
        }
        let called: HashSet<&str> = records.iter().map(|r| r.name.as_str()).filter(|name| self.allowed.iter().any(|a| a == name)).collect();
        if self.config.required_tools.is_empty() {
            if called.is_empty() {
                return vec!["any enabled tool".to_string()];
            }
            return Vec::new();
        }
        self.config.required_tools.iter().filter(|name| !called.contains(name.as_str())).cloned().collect()
    }
}
