//! Execution engine - the main entry point for blockflow.
//!
//! The engine manages the lifecycle of executions, including:
//! - Validating workflow definitions and inputs
//! - Starting, cancelling and awaiting executions
//! - Managing the event channel
//! - Graceful shutdown coordination

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::Stream;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::{
    BlockflowError, ChannelEvent, ChannelOptions, Config, Result,
    common::{MemCache, Queue, Shutdown},
    dispatcher::Dispatcher,
    events::{Event, ExecutionComplete, Message},
    model::{ExecutionResult, WorkflowModel},
    runtime::{Channel, Context, ExecutionCommand, ExecutionHandle, ExecutionId, Reporter, Services},
    utils,
    workflow::{ValidationError, Workflow, validate, validate_input},
};

/// Maximum number of executions tracked for cancellation.
const EXECUTION_CACHE_SIZE: usize = 2048;
/// Size of the queue for completed execution notifications.
const EXECUTION_COMPLETE_QUEUE_SIZE: usize = 100;
/// Size of the command queue of one execution.
const COMMAND_QUEUE_SIZE: usize = 16;

/// The main execution engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().llm_client(client).tool_registry(tools).build()?;
/// engine.launch();
///
/// let workflow = WorkflowModel::from_json(json_str)?;
/// let result = engine.execute(&workflow, json!({"topic": "rust"})).await?;
///
/// engine.shutdown();
/// ```
pub struct Engine {
    /// Event channel for broadcasting execution events.
    channel: Arc<Channel>,
    /// Queue for receiving execution completion notifications.
    complete_queue: Arc<Queue<ExecutionId>>,
    /// Command queues of running executions.
    executions: Arc<MemCache<ExecutionId, Arc<Queue<ExecutionCommand>>>>,
    config: Config,
    services: Services,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Handle,
    /// Shutdown coordinator for graceful termination.
    shutdown: Shutdown,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        services: Services,
        runtime: Handle,
    ) -> Self {
        let channel = Arc::new(Channel::new(config.event_buffer_size, config.log_buffer_size, runtime.clone()));

        Self {
            channel,
            complete_queue: Queue::new(EXECUTION_COMPLETE_QUEUE_SIZE),
            executions: Arc::new(MemCache::new(EXECUTION_CACHE_SIZE)),
            config,
            services,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Shutdown::new(),
        }
    }

    /// Starts the engine and begins dispatching events to handlers.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        self.channel.listen();

        let complete_queue = self.complete_queue.clone();
        let executions = self.executions.clone();
        if let Ok(events) = ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()) {
            events.on_complete(move |complete| {
                if complete_queue.send(complete.execution_id.clone()).is_err() {
                    executions.remove(&complete.execution_id);
                }
            });
        }

        let complete_queue = self.complete_queue.clone();
        let shutdown = self.shutdown.clone();
        let executions = self.executions.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(id) = complete_queue.next_async() => {
                        executions.remove(&id);
                    }
                }
            }
        });
        info!("Engine launched");
    }

    /// Gracefully shuts down the engine, cancelling every running execution.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        for (_, commands) in self.executions.iter() {
            let _ = commands.send(ExecutionCommand::Cancel);
        }
        self.channel.shutdown();
        info!("Engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Structural checks of a workflow definition.
    pub fn validate(
        &self,
        workflow: &WorkflowModel,
    ) -> Vec<ValidationError> {
        validate(workflow)
    }

    /// Start an execution in the background.
    ///
    /// A workflow or input that fails validation still yields a handle; its
    /// result is failed and carries the validation errors.
    pub fn start(
        &self,
        workflow: &WorkflowModel,
        input: Value,
    ) -> Result<ExecutionHandle> {
        if !self.is_running() {
            return Err(BlockflowError::Engine("Engine is not running".to_string()));
        }

        let execution_id = utils::longid();
        let command_queue = Queue::new(COMMAND_QUEUE_SIZE);

        let mut errors = validate(workflow);
        if errors.is_empty() {
            errors = validate_input(workflow, &input);
        }
        if !errors.is_empty() {
            warn!(execution_id = %execution_id, workflow_id = %workflow.id, errors = errors.len(), "Workflow rejected");
            let result = ExecutionResult::rejected(execution_id.clone(), errors);
            Reporter::new(&execution_id, self.channel.clone()).complete(ExecutionComplete {
                execution_id: execution_id.clone(),
                status: result.status,
                final_output: None,
                error: result.error.clone(),
                duration_ms: 0,
            });
            let join = self.runtime.spawn(async move { result });
            return Ok(ExecutionHandle::new(execution_id, command_queue, join));
        }

        let graph = Arc::new(Workflow::try_from(workflow)?);
        let limits = self.config.limits(workflow);

        let variables: Map<String, Value> =
            workflow.variables.iter().filter_map(|v| v.default_value.clone().map(|default| (v.name.clone(), default))).collect();
        let blocks = graph.blocks().map(|b| (b.id.clone(), b.normalized_id.clone())).collect();
        let ctx = Arc::new(Context::new(&execution_id, input, variables, blocks, self.channel.clone(), self.services.clone(), limits));

        self.executions.set(execution_id.clone(), command_queue.clone());

        let dispatcher = Dispatcher::new(ctx, graph, command_queue.clone(), self.runtime.clone());
        let join = self.runtime.spawn(dispatcher.run());

        Ok(ExecutionHandle::new(execution_id, command_queue, join))
    }

    /// Run a workflow to completion.
    pub async fn execute(
        &self,
        workflow: &WorkflowModel,
        input: Value,
    ) -> Result<ExecutionResult> {
        self.start(workflow, input)?.wait().await
    }

    /// Cancel a running execution by its id.
    pub fn cancel(
        &self,
        execution_id: &str,
    ) -> Result<()> {
        match self.executions.get(&execution_id.to_string()) {
            Some(commands) => commands.send(ExecutionCommand::Cancel),
            None => Err(BlockflowError::Engine(format!("Execution {} not found", execution_id))),
        }
    }

    /// Stream of progress messages matching `options`.
    pub fn subscribe(
        &self,
        options: ChannelOptions,
    ) -> Result<impl Stream<Item = Event<Message>> + Send + 'static> {
        self.channel.subscribe(options)
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use serde_json::json;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::{
        BlockStatus, EngineBuilder, ExecutionStatus,
        error::ErrorKind,
        events::{ExecutionEvent, UpdateStatus},
        llm::ChatResponse,
        testing::{CountingTool, EchoTool, FailingTool, ScriptedLlm, SleepTool},
        tools::ToolRegistry,
        workflow::ValidationErrorType,
    };

    fn engine_with(tools: ToolRegistry) -> Engine {
        let engine = EngineBuilder::new().tool_registry(tools).build().unwrap();
        engine.launch();
        engine
    }

    fn engine() -> Engine {
        engine_with(ToolRegistry::new())
    }

    fn workflow(value: Value) -> WorkflowModel {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_linear_workflow_interpolates_outputs() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::new("echo"));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [
                {"id": "a", "name": "Block A", "type": "tool_execution", "config": {"toolName": "echo", "argumentMapping": {"total": 42}}},
                {"id": "blockA", "type": "tool_execution", "config": {"toolName": "echo", "argumentMapping": {"total": "{{block-a.result.total}}"}}},
                {"id": "b", "name": "Summary", "type": "variable", "config": {"operation": "set", "value": "total={{blockA.result.total}}"}}
            ],
            "connections": [
                {"sourceBlockId": "a", "targetBlockId": "blockA"},
                {"sourceBlockId": "blockA", "targetBlockId": "b"}
            ]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.error.is_none());
        // a whole-value reference keeps the number, an embedded one renders it
        assert_eq!(result.block("blockA").unwrap().outputs.as_ref().unwrap().get_value("result"), Some(&json!({"total": 42})));
        assert_eq!(result.output.get_value("summary"), Some(&json!({"value": "total=42"})));
        assert_eq!(result.block("b").unwrap().inputs, Some(json!({"operation": "set", "value": "total=42"})));
    }

    #[tokio::test]
    async fn test_topological_order() {
        let engine = engine();
        let wf = workflow(json!({
            "blocks": [
                {"id": "d", "type": "variable"},
                {"id": "c", "type": "variable"},
                {"id": "b", "type": "variable"},
                {"id": "a", "type": "variable"}
            ],
            "connections": [
                {"sourceBlockId": "a", "targetBlockId": "b"},
                {"sourceBlockId": "a", "targetBlockId": "c"},
                {"sourceBlockId": "b", "targetBlockId": "d"},
                {"sourceBlockId": "c", "targetBlockId": "d"}
            ]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        let started = |id: &str| result.block(id).unwrap().started_at.unwrap();
        let completed = |id: &str| result.block(id).unwrap().completed_at.unwrap();
        for (src, dst) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            assert!(completed(src) <= started(dst), "{src} must finish before {dst} starts");
        }
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_execution() {
        let engine = engine();
        let wf = workflow(json!({
            "blocks": [
                {"id": "a", "type": "variable"},
                {"id": "b", "type": "variable"},
                {"id": "c", "type": "variable"}
            ],
            "connections": [
                {"sourceBlockId": "a", "targetBlockId": "b"},
                {"sourceBlockId": "b", "targetBlockId": "c"},
                {"sourceBlockId": "c", "targetBlockId": "a"}
            ]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.block_states.is_empty());
        assert_eq!(result.validation_errors[0].kind, ValidationErrorType::Cycle);
    }

    #[tokio::test]
    async fn test_input_type_mismatch_rejected() {
        let engine = engine();
        let wf = workflow(json!({
            "blocks": [{"id": "a", "type": "variable", "config": {"variableName": "limit"}}],
            "variables": [{"name": "limit", "type": "number", "defaultValue": 5}]
        }));

        let result = engine.execute(&wf, json!({"limit": "five"})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.validation_errors[0].kind, ValidationErrorType::TypeMismatch);

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.output.get_value("a"), Some(&json!({"value": 5, "limit": 5})));
    }

    #[tokio::test]
    async fn test_parallelism_bound() {
        let counter = CountingTool::new("work", Duration::from_millis(20));
        let peak = counter.peak();
        let mut tools = ToolRegistry::new();
        tools.register(counter);
        let engine = engine_with(tools);

        let blocks: Vec<Value> = (0..8).map(|i| json!({"id": format!("w{i}"), "type": "tool_execution", "config": {"toolName": "work"}})).collect();
        let wf = workflow(json!({"blocks": blocks, "maxParallelBlocks": 3}));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("broken", "exploded", None));
        tools.register(EchoTool::new("echo"));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [
                {"id": "a", "type": "variable"},
                {"id": "bad", "name": "Bad Step", "type": "tool_execution", "config": {"toolName": "broken"}},
                {"id": "after", "type": "tool_execution", "config": {"toolName": "echo"}},
                {"id": "last", "type": "variable"},
                {"id": "side", "type": "variable"}
            ],
            "connections": [
                {"sourceBlockId": "a", "targetBlockId": "bad"},
                {"sourceBlockId": "bad", "targetBlockId": "after"},
                {"sourceBlockId": "after", "targetBlockId": "last"},
                {"sourceBlockId": "a", "targetBlockId": "side"}
            ]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.block("bad").unwrap().status, BlockStatus::Failed);
        assert_eq!(result.block("after").unwrap().status, BlockStatus::Skipped);
        assert_eq!(result.block("last").unwrap().status, BlockStatus::Skipped);
        assert_eq!(result.block("side").unwrap().status, BlockStatus::Completed);
        // `side` is a completed terminal block
        assert_eq!(result.status, ExecutionStatus::PartialFailure);
        assert_eq!(result.error.as_deref(), Some("Bad Step: exploded"));
        assert!(result.output.contains_key("side"));
        assert!(!result.output.contains_key("last"));
    }

    #[tokio::test]
    async fn test_output_block_failure_fails_execution() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("broken", "exploded", None));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [
                {"id": "ok", "type": "variable"},
                {"id": "bad", "type": "tool_execution", "config": {"toolName": "broken"}}
            ],
            "outputBlockId": "bad"
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_every_source() {
        let mut tools = ToolRegistry::new();
        tools.register(SleepTool::new("slow", Duration::from_millis(30)));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [
                {"id": "fast", "type": "variable", "config": {"operation": "set", "value": 1}},
                {"id": "slow", "type": "tool_execution", "config": {"toolName": "slow"}},
                {"id": "join", "type": "variable", "config": {"operation": "set", "value": "{{fast.value}}-{{slow.result}}"}}
            ],
            "connections": [
                {"sourceBlockId": "fast", "targetBlockId": "join"},
                {"sourceBlockId": "slow", "targetBlockId": "join"}
            ]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output.get_value("join"), Some(&json!({"value": "1-slept"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_recorded_in_block_state() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("broken", "503 upstream", None));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [{
                "id": "b",
                "type": "tool_execution",
                "config": {"toolName": "broken"},
                "retryConfig": {"maxRetries": 3, "retryOn": ["server_error"], "backoffMs": 1000, "maxBackoffMs": 8000}
            }]
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        let state = result.block("b").unwrap();
        assert_eq!(state.status, BlockStatus::Failed);
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.retry_history.len(), 4);
        assert_eq!(state.error_kind, Some(ErrorKind::ServerError));
        assert_eq!(state.error.as_deref(), Some("503 upstream"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_timeout() {
        let mut tools = ToolRegistry::new();
        tools.register(SleepTool::new("sleep", Duration::from_secs(10)));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [
                {"id": "s1", "type": "tool_execution", "config": {"toolName": "sleep"}},
                {"id": "s2", "type": "tool_execution", "config": {"toolName": "sleep"}},
                {"id": "next", "type": "variable"}
            ],
            "connections": [{"sourceBlockId": "s1", "targetBlockId": "next"}],
            "workflowTimeout": 1
        }));

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("workflow timed out after 1s"));
        for state in result.block_states.values() {
            assert!(state.status.is_terminal(), "{} left {:?}", state.block_id, state.status);
        }
        assert_eq!(result.block("s1").unwrap().error_kind, Some(ErrorKind::Timeout));
        assert_eq!(result.block("next").unwrap().status, BlockStatus::Skipped);
    }

    #[tokio::test]
    async fn test_cancel_running_execution() {
        let mut tools = ToolRegistry::new();
        tools.register(SleepTool::new("sleep", Duration::from_secs(30)));
        let engine = engine_with(tools);
        let wf = workflow(json!({"blocks": [{"id": "s", "type": "tool_execution", "config": {"toolName": "sleep"}}]}));

        let handle = engine.start(&wf, json!({})).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.cancel(handle.id()).unwrap();

        let result = handle.wait().await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("execution cancelled"));
        assert_eq!(result.block("s").unwrap().error_kind, Some(ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_agent_missing_required_tool() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::new("search"));
        let llm = ScriptedLlm::new(vec![
            Ok(ChatResponse::text("I already know")),
            Ok(ChatResponse::text("Still no search")),
            Ok(ChatResponse::text("Final guess")),
        ]);
        let engine = EngineBuilder::new().tool_registry(tools).llm_client(Arc::new(llm)).build().unwrap();
        engine.launch();
        let wf = workflow(json!({
            "blocks": [{
                "id": "agent",
                "type": "llm_inference",
                "config": {"model": "m", "userPrompt": "Research {{topic}}", "requiredTools": ["search"]}
            }]
        }));

        let result = engine.execute(&wf, json!({"topic": "rust"})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.block("agent").unwrap().error_kind, Some(ErrorKind::MissingRequiredTool));
    }

    #[tokio::test]
    async fn test_progress_stream() {
        let engine = engine();
        let wf = workflow(json!({
            "blocks": [{"id": "a", "type": "variable"}, {"id": "b", "type": "variable"}],
            "connections": [{"sourceBlockId": "a", "targetBlockId": "b"}]
        }));
        let stream = engine.subscribe(ChannelOptions::default()).unwrap();
        tokio::pin!(stream);

        let handle = engine.start(&wf, json!({})).unwrap();
        let id = handle.id().to_string();
        handle.wait().await.unwrap();

        let mut seqs = Vec::new();
        let mut statuses = Vec::new();
        while let Some(message) = stream.next().await {
            assert_eq!(message.execution_id, id);
            seqs.push(message.seq);
            match &message.event {
                ExecutionEvent::Update(update) => statuses.push((update.block_id.clone(), update.status)),
                ExecutionEvent::Complete(complete) => {
                    assert_eq!(complete.status, ExecutionStatus::Completed);
                    break;
                }
            }
        }
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            statuses,
            vec![
                ("a".to_string(), UpdateStatus::Running),
                ("a".to_string(), UpdateStatus::Completed),
                ("b".to_string(), UpdateStatus::Running),
                ("b".to_string(), UpdateStatus::Completed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_reported_on_the_stream() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("broken", "exploded", None));
        let engine = engine_with(tools);
        let wf = workflow(json!({
            "blocks": [{
                "id": "a",
                "type": "tool_execution",
                "config": {"toolName": "broken"},
                "retryConfig": {"maxRetries": 1, "retryOn": ["server_error"], "backoffMs": 10}
            }]
        }));
        let stream = engine.subscribe(ChannelOptions::default()).unwrap();
        tokio::pin!(stream);

        let result = engine.execute(&wf, json!({})).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);

        let mut updates = Vec::new();
        while let Some(message) = stream.next().await {
            match &message.event {
                ExecutionEvent::Update(update) => updates.push(update.clone()),
                ExecutionEvent::Complete(_) => break,
            }
        }
        let statuses: Vec<(UpdateStatus, Option<u32>)> = updates.iter().map(|u| (u.status, u.attempt)).collect();
        assert_eq!(
            statuses,
            vec![(UpdateStatus::Running, Some(0)), (UpdateStatus::Retrying, Some(1)), (UpdateStatus::Failed, None)]
        );
        assert_eq!(updates[1].error.as_deref(), Some("exploded"));
        assert_eq!(updates[1].error_kind, Some(ErrorKind::ServerError));
    }

    #[tokio::test]
    async fn test_slow_subscriber_still_sees_every_completion() {
        let engine = EngineBuilder::new()
            .config(Config {
                event_buffer_size: 4,
                ..Default::default()
            })
            .build()
            .unwrap();
        engine.launch();
        let stream = engine.subscribe(ChannelOptions::default()).unwrap();
        tokio::pin!(stream);

        let first = workflow(json!({"blocks": [{"id": "a", "type": "variable"}]}));
        let second = workflow(json!({
            "blocks": [{"id": "x1", "type": "variable"}, {"id": "x2", "type": "variable"}, {"id": "x3", "type": "variable"}]
        }));
        let first = engine.start(&first, json!({})).unwrap();
        let first_id = first.id().to_string();
        first.wait().await.unwrap();
        let second = engine.start(&second, json!({})).unwrap();
        let second_id = second.id().to_string();
        second.wait().await.unwrap();

        let mut completed = Vec::new();
        let mut received = 0;
        while completed.len() < 2 {
            let message = tokio::time::timeout(Duration::from_secs(5), stream.next()).await.unwrap().unwrap();
            received += 1;
            if let ExecutionEvent::Complete(complete) = &message.event {
                completed.push(complete.execution_id.clone());
            }
        }
        assert_eq!(completed, vec![first_id, second_id]);
        assert_eq!(received, 4);
    }

    #[tokio::test]
    async fn test_on_complete_handler() {
        let engine = engine();
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        ChannelEvent::channel(engine.channel(), ChannelOptions::default()).unwrap().on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let wf = workflow(json!({"blocks": [{"id": "a", "type": "variable"}]}));
        engine.execute(&wf, json!({})).await.unwrap();
        for _ in 0..50 {
            if completions.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_launched() {
        let engine = EngineBuilder::new().build().unwrap();
        let wf = workflow(json!({"blocks": [{"id": "a", "type": "variable"}]}));
        assert!(engine.start(&wf, json!({})).is_err());
        assert!(engine.cancel("missing").is_err());
    }
}
