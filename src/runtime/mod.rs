mod channel;
mod context;
mod execution;
mod reporter;
mod subscription;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::{Context, Services};
pub use execution::{ExecutionCommand, ExecutionHandle, ExecutionId};
pub use reporter::Reporter;
