//! Model provider seam, structured-reply schema, and validation.

#![deny(unsafe_code)]

pub mod prompts;
pub mod provider;
pub mod reply;
pub mod validator;

pub use prompts::{base_system_prompt, repair_system_prompt};
pub use provider::{
    InferRequest, ModelProvider, ModelReply, ProviderError, ToolCall, ToolDef, ToolResult,
};
pub use reply::{Awf, Choice};
pub use validator::{repair_hint, validate_reply};
