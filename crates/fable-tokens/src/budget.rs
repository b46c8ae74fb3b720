//! Budget result types.
//!
//! Produced fresh by every enforcement pass; never persisted.

use serde::{Deserialize, Serialize};

/// A reduction stage the enforcer can apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionKind {
    /// Dropped lowest-priority active NPCs toward the floor.
    NpcTrim,
    /// Dropped or further-compacted lore slices.
    SliceTrim,
    /// Capped a long array field (e.g. cast) during document compaction.
    CastCap,
    /// Elided a free-text field (synopsis, seasons).
    FieldElide,
    /// Dropped a sub-document entirely.
    DocDrop,
}

impl ReductionKind {
    /// Stable string form for metrics labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NpcTrim => "npc_trim",
            Self::SliceTrim => "slice_trim",
            Self::CastCap => "cast_cap",
            Self::FieldElide => "field_elide",
            Self::DocDrop => "doc_drop",
        }
    }
}

/// One applied reduction with its measured savings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reduction {
    /// What kind of reduction ran.
    pub kind: ReductionKind,
    /// Human-readable description, e.g. `"dropped 3 NPCs (floor 5)"`.
    pub description: String,
    /// Tokens saved, measured (not assumed) against the estimate before
    /// this stage.
    pub tokens_saved: u64,
}

/// Outcome of the input-budget reduction cascade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetResult {
    /// Whether the final estimate fits the ceiling.
    pub within_budget: bool,
    /// Reductions applied, in cascade order.
    pub reductions: Vec<Reduction>,
    /// Final token estimate after all applied stages.
    pub final_tokens: u64,
}

/// Outcome of the pure output-budget measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBudgetCheck {
    /// Whether the output fits its ceiling.
    pub within_budget: bool,
    /// Estimated output tokens.
    pub estimated_tokens: u64,
    /// The output ceiling.
    pub max_tokens: u64,
}

/// The output-side configuration the model provider must honor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Output token ceiling.
    pub max_output_tokens: u64,
    /// Sampling temperature.
    pub temperature: f64,
}
