use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{BlockflowError, ExecutionResult, Result, common::Queue};

pub type ExecutionId = String;

#[derive(Debug, Clone)]
pub enum ExecutionCommand {
    /// Stop the execution: running blocks fail, pending blocks are skipped.
    Cancel,
}

/// Handle to a started execution.
pub struct ExecutionHandle {
    id: ExecutionId,
    command_queue: Arc<Queue<ExecutionCommand>>,
    join: JoinHandle<ExecutionResult>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        id: ExecutionId,
        command_queue: Arc<Queue<ExecutionCommand>>,
        join: JoinHandle<ExecutionResult>,
    ) -> Self {
        Self {
            id,
            command_queue,
            join,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cancellation. Has no effect once the execution finished.
    pub fn cancel(&self) {
        let _ = self.command_queue.send(ExecutionCommand::Cancel);
    }

    /// Wait for the terminal result.
    pub async fn wait(self) -> Result<ExecutionResult> {
        self.join.await.map_err(|e| BlockflowError::Runtime(format!("execution {} task failed: {}", self.id, e)))
    }
}
