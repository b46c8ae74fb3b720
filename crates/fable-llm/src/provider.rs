//! Model provider seam.
//!
//! The orchestrator talks to the model exclusively through [`ModelProvider`];
//! swapping providers never touches the pipeline. Tool calls are *returned*
//! by the provider and executed by the orchestrator (which owns the quota);
//! the provider only ferries definitions, calls, and results across the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use fable_bundle::Bundle;
use fable_tokens::budget::ModelConfig;

/// Provider failure. Fatal for the turn; the single validation-repair retry
/// never applies to provider failures.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider-reported message.
    pub message: String,
    /// Whether the provider considers the failure transient.
    pub retryable: bool,
}

impl ProviderError {
    /// A transient failure (rate limit, overload).
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent failure (bad request, auth).
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// One tool the model may call during a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// A tool call the model requested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Name of the requested tool.
    pub name: String,
    /// Arguments as the model produced them.
    pub arguments: Value,
}

/// The result of one executed (or denied) tool call, fed back on the second
/// round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Tool name.
    pub name: String,
    /// Result payload; a denied stub for calls beyond the quota.
    pub result: Value,
}

/// One inference request.
#[derive(Clone, Debug)]
pub struct InferRequest<'a> {
    /// System prompt for this attempt.
    pub system: &'a str,
    /// The assembled bundle.
    pub bundle: &'a Bundle,
    /// Output ceiling and temperature the provider must honor.
    pub config: ModelConfig,
    /// Results of tool calls from the previous round trip, if any.
    pub tool_results: &'a [ToolResult],
}

/// One model reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    /// Raw text as produced.
    pub raw: String,
    /// Parsed structured reply, if the provider extracted one.
    pub json: Option<Value>,
    /// Tool calls the model requested this round trip.
    pub tool_calls: Vec<ToolCall>,
}

/// The swappable model backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Plain inference, no tools offered.
    async fn infer(&self, request: InferRequest<'_>) -> Result<ModelReply, ProviderError>;

    /// Inference with tools offered. The provider returns any tool calls the
    /// model made; it does not execute them.
    async fn infer_with_tools(
        &self,
        request: InferRequest<'_>,
        tools: &[ToolDef],
    ) -> Result<ModelReply, ProviderError>;
}
