mod action;
mod config;
mod output;
mod tool_loop;

pub use action::AgentAction;
pub use config::AgentBlockConfig;
pub use output::{StructuredOutput, extract_json, structure_output};
pub use tool_loop::{LoopOutcome, ToolCallRecord};
