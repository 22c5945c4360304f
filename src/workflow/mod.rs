pub mod actions;
pub mod block;
pub mod template;
pub mod validate;
mod workflow;

pub use block::{Block, BlockId};
pub use validate::{ValidationError, ValidationErrorType, validate, validate_input};
pub use workflow::{Connection, Workflow};
