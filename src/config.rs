use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{BlockflowError, Result, WorkflowModel, retry::RetryPolicy};

/// Engine-wide defaults. Workflow-level settings override them per execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// hard deadline of one execution in seconds, defaults to 600
    pub workflow_timeout_secs: u64,
    /// concurrently running blocks per execution, defaults to 20
    pub max_parallel_blocks: usize,
    /// per-attempt block timeout in seconds, defaults to 30
    pub block_timeout_secs: u64,
    /// capacity of the progress event channel, defaults to 2048
    pub event_buffer_size: usize,
    /// capacity of the log channel, defaults to 4096
    pub log_buffer_size: usize,
    /// consecutive failures of one error source before retries stop, 0 disables, defaults to 5
    pub circuit_breaker_threshold: u32,
    /// ceiling on model round-trips of one agent block, defaults to 25
    pub max_agent_iterations: u32,
    /// retry policy for transient model API failures when a block sets none
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_timeout_secs: 600,
            max_parallel_blocks: 20,
            block_timeout_secs: 30,
            event_buffer_size: 2048,
            log_buffer_size: 4096,
            circuit_breaker_threshold: 5,
            max_agent_iterations: 25,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| BlockflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }

    /// Resolve the limits of one execution of `workflow`.
    pub(crate) fn limits(
        &self,
        workflow: &WorkflowModel,
    ) -> Limits {
        Limits {
            workflow_timeout: Duration::from_secs(workflow.workflow_timeout.filter(|t| *t > 0).unwrap_or(self.workflow_timeout_secs)),
            max_parallel_blocks: workflow.max_parallel_blocks.filter(|n| *n > 0).unwrap_or(self.max_parallel_blocks).max(1),
            block_timeout: Duration::from_secs(self.block_timeout_secs),
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            max_agent_iterations: self.max_agent_iterations,
            llm_retry: self.retry.clone(),
        }
    }
}

/// Limits of one execution, fixed when it starts.
#[derive(Debug, Clone)]
pub struct Limits {
    pub workflow_timeout: Duration,
    pub max_parallel_blocks: usize,
    /// Used when a block sets no timeout of its own.
    pub block_timeout: Duration,
    pub circuit_breaker_threshold: u32,
    pub max_agent_iterations: u32,
    pub llm_retry: RetryPolicy,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits(&WorkflowModel::default())
    }
}
