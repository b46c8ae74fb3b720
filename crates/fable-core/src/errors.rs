//! Error taxonomy for the turn pipeline.
//!
//! Built on [`thiserror`] with a hard split between **fatal** and
//! **non-fatal** conditions:
//!
//! - Fatal phase failures surface as [`TurnError`] through `Result` returns.
//!   A fatal error aborts the turn with no partial narrative and no partial
//!   state change.
//! - Non-fatal per-act issues (unknown act types, malformed fields, missing
//!   keys) never appear here; they accumulate as violations on the apply
//!   summary instead.
//!
//! Every [`TurnError`] can report the [`TurnPhase`] it belongs to, a
//! machine-readable code, and whether the caller may safely re-run the turn.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TurnPhase
// ─────────────────────────────────────────────────────────────────────────────

/// The five ordered phases of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Bundle assembly (document resolution, compaction, budget).
    Assemble,
    /// Model inference, including the optional tool round-trip.
    Infer,
    /// Structured-reply extraction and schema validation.
    Validate,
    /// Act application and state commit.
    Apply,
    /// Mapping the validated reply to the caller-facing shape.
    Respond,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assemble => write!(f, "assemble"),
            Self::Infer => write!(f, "infer"),
            Self::Validate => write!(f, "validate"),
            Self::Apply => write!(f, "apply"),
            Self::Respond => write!(f, "respond"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DocKind
// ─────────────────────────────────────────────────────────────────────────────

/// Kinds of documents the pipeline resolves.
///
/// Used in [`TurnError::NotFound`] and as the type component of cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    /// Player session.
    Session,
    /// Persistent per-session game state.
    GameState,
    /// Core contract (per-turn rules).
    CoreContract,
    /// Pacing / narration ruleset.
    Ruleset,
    /// World document.
    World,
    /// Adventure document.
    Adventure,
    /// Adventure start (scenario) document.
    AdventureStart,
    /// NPC document.
    Npc,
    /// Injection map.
    InjectionMap,
    /// Lore slice.
    Slice,
}

impl DocKind {
    /// Stable string form used in cache keys and error codes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::GameState => "game_state",
            Self::CoreContract => "core_contract",
            Self::Ruleset => "ruleset",
            Self::World => "world",
            Self::Adventure => "adventure",
            Self::AdventureStart => "adventure_start",
            Self::Npc => "npc",
            Self::InjectionMap => "injection_map",
            Self::Slice => "slice",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnError
// ─────────────────────────────────────────────────────────────────────────────

/// Fatal turn failure.
///
/// Any of these aborts the turn. The player-facing platform is expected to
/// surface a generic retryable error rather than a half-applied turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// A required document, session, or game state could not be resolved.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of document was missing.
        kind: DocKind,
        /// The ID that failed to resolve.
        id: String,
    },

    /// The bundle could not be brought under the input ceiling after the
    /// full reduction cascade. No model call is made.
    #[error("bundle over budget after full reduction cascade: {estimated} > {limit} tokens")]
    BudgetExceeded {
        /// Final token estimate after all reduction stages.
        estimated: u64,
        /// The hard input ceiling.
        limit: u64,
    },

    /// The model provider failed. Fatal for this turn; the single
    /// validation-repair retry does not apply to provider failures.
    #[error("model provider error: {message}")]
    Model {
        /// Provider-reported message.
        message: String,
        /// Whether the provider considers the failure transient.
        retryable: bool,
    },

    /// A first/subsequent-turn act-shape contract rule was broken.
    #[error("contract violation ({rule}): {message}")]
    ContractViolation {
        /// Short rule identifier, e.g. `time_advance_required`.
        rule: String,
        /// Human-readable description.
        message: String,
    },

    /// The structured reply failed schema validation even after the single
    /// repair retry.
    #[error("reply validation failed after repair retry: {}", errors.join("; "))]
    ValidationFailed {
        /// Validation errors from the final attempt.
        errors: Vec<String>,
    },

    /// Persistence failed while committing the new game state. The prior
    /// persisted state remains the truth.
    #[error("apply commit failed: {message}")]
    Apply {
        /// Store-reported message.
        message: String,
    },

    /// Internal invariant failure with a machine-readable code.
    #[error("[{code}] {message}")]
    Internal {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl TurnError {
    /// Convenience constructor for [`TurnError::NotFound`].
    #[must_use]
    pub fn not_found(kind: DocKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Convenience constructor for [`TurnError::ContractViolation`].
    #[must_use]
    pub fn contract(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContractViolation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`TurnError::Internal`].
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The phase this failure belongs to.
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        match self {
            Self::NotFound { .. } | Self::BudgetExceeded { .. } => TurnPhase::Assemble,
            Self::Model { .. } => TurnPhase::Infer,
            Self::ValidationFailed { .. } => TurnPhase::Validate,
            Self::ContractViolation { .. } | Self::Apply { .. } => TurnPhase::Apply,
            Self::Internal { .. } => TurnPhase::Respond,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::Model { .. } => "MODEL_ERROR",
            Self::ContractViolation { .. } => "CONTRACT_VIOLATION",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::Apply { .. } => "APPLY_ERROR",
            Self::Internal { code, .. } => code,
        }
    }

    /// Whether the caller may re-run the turn and plausibly succeed.
    ///
    /// `NotFound` and contract violations are deterministic; retrying them
    /// without changing inputs cannot help. Provider failures and commit
    /// races can clear on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model { retryable, .. } => *retryable,
            Self::Apply { .. } => true,
            Self::NotFound { .. }
            | Self::BudgetExceeded { .. }
            | Self::ContractViolation { .. }
            | Self::ValidationFailed { .. }
            | Self::Internal { .. } => false,
        }
    }
}

/// Result alias used throughout the pipeline.
pub type TurnResult<T> = Result<T, TurnError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
