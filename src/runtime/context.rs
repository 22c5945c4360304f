use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::{Map, Value};

use crate::{
    common::{Shutdown, Vars},
    config::Limits,
    events::{Event, Log},
    llm::LlmClient,
    retry::CircuitBreaker,
    runtime::{Channel, Reporter},
    tools::ToolRegistry,
    utils,
    workflow::template::Scope,
};

/// Collaborators shared by every execution of an engine.
#[derive(Clone)]
pub struct Services {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub tools: Arc<ToolRegistry>,
    pub http: reqwest::Client,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            llm: None,
            tools: Arc::new(ToolRegistry::new()),
            http: reqwest::Client::new(),
        }
    }
}

/// State of one execution shared with its block workers.
pub struct Context {
    execution_id: String,
    input: Value,
    /// Variable defaults overridden by input keys, plus `input` itself.
    variables: Map<String, Value>,
    /// `(id, normalized id)` of every block.
    blocks: Vec<(String, String)>,
    /// Keyed by id and by normalized id. Never evicted while the execution runs.
    outputs: RwLock<HashMap<String, Vars>>,
    channel: Arc<Channel>,
    reporter: Reporter,
    services: Services,
    limits: Limits,
    breaker: CircuitBreaker,

    shutdown: Shutdown,
}

impl Context {
    pub fn new(
        execution_id: &str,
        input: Value,
        mut variables: Map<String, Value>,
        blocks: Vec<(String, String)>,
        channel: Arc<Channel>,
        services: Services,
        limits: Limits,
    ) -> Self {
        if let Value::Object(fields) = &input {
            for (k, v) in fields {
                variables.insert(k.clone(), v.clone());
            }
        }
        variables.insert("input".to_string(), input.clone());

        Self {
            execution_id: execution_id.to_string(),
            input,
            variables,
            outputs: RwLock::new(HashMap::with_capacity(blocks.len() * 2)),
            blocks,
            reporter: Reporter::new(execution_id, channel.clone()),
            channel,
            services,
            breaker: CircuitBreaker::new(limits.circuit_breaker_threshold),
            limits,
            shutdown: Shutdown::new(),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn variable(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Record the outputs of a completed block under both its keys.
    pub fn add_output(
        &self,
        block_id: &str,
        normalized_id: &str,
        outputs: Vars,
    ) {
        let mut entries = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        if normalized_id != block_id {
            entries.insert(normalized_id.to_string(), outputs.clone());
        }
        entries.insert(block_id.to_string(), outputs);
    }

    /// Snapshot of everything interpolation can see right now.
    pub fn scope(&self) -> Scope {
        let mut scope = Scope::new(self.variables.clone());
        let entries = self.outputs.read().unwrap_or_else(|e| e.into_inner());
        for (id, normalized) in &self.blocks {
            for key in [normalized, id] {
                match entries.get(key) {
                    Some(outputs) => scope.add_output(key, outputs.clone().into()),
                    None => scope.add_block(key),
                }
            }
        }
        scope
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn emit_log(
        &self,
        block_id: &str,
        content: String,
    ) {
        let log = Log {
            execution_id: self.execution_id.clone(),
            block_id: block_id.to_string(),
            content,
            timestamp: utils::time::time_millis(),
        };
        let _ = self.channel.log_queue().send(Event::new(&log));
    }

    /// Signal every worker of this execution to stop.
    pub fn cancel(&self) {
        self.shutdown.shutdown();
    }

    pub fn wait_shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shutdown.wait()
    }
}
