//! Caller-facing turn shapes and per-turn bookkeeping.

use serde::{Deserialize, Serialize};

use fable_bundle::AssembleMetrics;
use fable_llm::reply::Choice;
use fable_state::interpreter::ApplySummary;
use fable_tokens::budget::BudgetResult;

/// Response metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMeta {
    /// Scene the client should render after this turn.
    pub scn: String,
}

/// The caller-facing response shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// Narrative text.
    pub txt: String,
    /// Menu choices.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Metadata.
    pub meta: TurnMeta,
}

/// Tool-call accounting for one turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallCounts {
    /// Calls executed within the quota.
    pub executed: u32,
    /// Calls beyond the quota, answered with a denied stub.
    pub denied: u32,
}

/// Measured facts about one completed turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTelemetry {
    /// Assembly metrics.
    pub assemble: AssembleMetrics,
    /// Total model latency across round trips, in milliseconds.
    pub model_ms: u64,
    /// Whether the validation repair retry ran.
    pub retried: bool,
    /// Tool-call counts.
    pub tool_calls: ToolCallCounts,
}

/// A fully applied turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Caller-facing response.
    pub response: TurnResponse,
    /// Audit summary from act application.
    pub summary: ApplySummary,
    /// Game-state version after commit.
    pub state_version: u64,
    /// Budget cascade outcome for the bundle.
    pub budget: BudgetResult,
    /// Telemetry.
    pub telemetry: TurnTelemetry,
}

/// Phases 1–3 only; nothing mutated, nothing persisted.
#[derive(Clone, Debug)]
pub struct DryRunOutcome {
    /// The assembled bundle, exposed for inspection.
    pub bundle: fable_bundle::Bundle,
    /// The validated structured reply.
    pub reply: fable_llm::Awf,
    /// Budget cascade outcome.
    pub budget: BudgetResult,
    /// Telemetry (apply-phase fields stay at their defaults).
    pub telemetry: TurnTelemetry,
}

/// The validation state machine, kept explicit so the "exactly one retry"
/// contract is auditable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationAttempt {
    /// First attempt, base system prompt.
    Initial,
    /// Second and final attempt, repair-variant system prompt.
    RepairRetry,
}
