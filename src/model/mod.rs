mod block;
mod connection;
mod execution;
mod variable;
mod workflow;

pub use block::{BlockModel, RetryConfig};
pub use connection::ConnectionModel;
pub use execution::{BlockState, BlockStatus, ExecutionResult, ExecutionStatus, RetryAttempt};
pub use variable::{VariableModel, VariableType};
pub use workflow::WorkflowModel;
