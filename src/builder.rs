use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{BlockflowError, Config, Engine, Result, llm::LlmClient, runtime::Services, tools::ToolRegistry};

#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    rt: Option<Handle>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: ToolRegistry,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Run executions on `runtime` instead of the runtime `build` is called from.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn llm_client(
        mut self,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tool_registry(
        mut self,
        tools: ToolRegistry,
    ) -> Self {
        self.tools = tools;
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = match &self.rt {
            Some(rt) => rt.clone(),
            None => Handle::try_current().map_err(|e| BlockflowError::Engine(format!("no tokio runtime available: {e}")))?,
        };
        let services = Services {
            llm: self.llm.clone(),
            tools: Arc::new(self.tools.clone()),
            http: reqwest::Client::new(),
        };
        let engine = Engine::new(self.config.clone(), services, runtime);

        Ok(engine)
    }
}
