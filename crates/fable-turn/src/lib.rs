//! Turn orchestration: the five-phase pipeline over assembly, inference,
//! validation, act application, and response shaping.

#![deny(unsafe_code)]

pub mod orchestrator;
pub mod types;

pub use orchestrator::{LORE_TOOL, OrchestratorDeps, TurnOrchestrator, lore_tool};
pub use types::{
    DryRunOutcome, ToolCallCounts, TurnMeta, TurnOutcome, TurnResponse, TurnTelemetry,
    ValidationAttempt,
};
