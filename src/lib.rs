//! # Blockflow
//!
//! Blockflow executes agent workflows: directed acyclic graphs of blocks that
//! call models, tools and webhooks. It is designed to be embedded in
//! applications that bring their own model client and tools.
//!
//! ## Core Features
//!
//! - **Validated Graphs**: Cycles, dangling connections and unreachable references are rejected before anything runs
//! - **Bounded Parallelism**: Independent blocks run concurrently on `tokio`, up to a per-workflow limit
//! - **Classified Retries**: Failures carry a kind, and only the kinds a block opts into are retried with backoff
//! - **Agent Blocks**: A tool-calling LLM loop with required-tool enforcement and structured output
//! - **Progress Streaming**: Every block transition is published on a bounded event channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blockflow::{EngineBuilder, WorkflowModel};
//!
//! let engine = EngineBuilder::new().llm_client(client).tool_registry(tools).build()?;
//! engine.launch();
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! let result = engine.execute(&workflow, serde_json::json!({"topic": "rust"})).await?;
//! println!("{:?}: {}", result.status, serde_json::to_string(&result.output)?);
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod llm;
mod model;
mod retry;
mod runtime;
#[cfg(test)]
mod testing;
mod tools;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{Config, Limits};
pub use engine::Engine;
pub use error::{BlockError, BlockflowError, ErrorKind};
pub use events::{Event, ExecutionComplete, ExecutionEvent, ExecutionUpdate, Log, Message, UpdateStatus};
pub use llm::{ChatMessage, ChatRequest, ChatResponse, LlmClient, Role, TokenUsage, ToolCall};
pub use model::*;
pub use retry::{RetryCondition, RetryPolicy};
pub use runtime::{ChannelEvent, ChannelOptions, ExecutionHandle, ExecutionId};
pub use tools::{Tool, ToolDefinition, ToolError, ToolRegistry};
pub use workflow::{ValidationError, ValidationErrorType};

/// Result type alias for Blockflow operations.
pub type Result<T> = std::result::Result<T, BlockflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
