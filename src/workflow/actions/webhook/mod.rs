mod action;
mod models;

pub use action::WebhookAction;
pub use models::*;
