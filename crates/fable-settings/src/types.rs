//! Settings types with compiled defaults.
//!
//! Defaults here are the lowest-priority layer; a settings file deep-merges
//! over them and `FABLE_*` environment variables override both.

use serde::{Deserialize, Serialize};

/// Token budget settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BudgetSettings {
    /// Hard ceiling on estimated bundle tokens sent to the model.
    pub max_input_tokens: u64,
    /// Output ceiling the model provider must honor.
    pub max_output_tokens: u64,
    /// Sampling temperature for narrative generation.
    pub temperature: f64,
    /// Active-NPC floor the reduction cascade trims toward, never below.
    pub npc_floor: usize,
    /// Per-slice compaction ceiling in tokens.
    pub slice_max_tokens: u64,
    /// Per-sub-document ceiling (world/adventure) in tokens.
    pub doc_max_tokens: u64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            max_input_tokens: 8_000,
            max_output_tokens: 1_200,
            temperature: 0.8,
            npc_floor: 5,
            slice_max_tokens: 300,
            doc_max_tokens: 1_500,
        }
    }
}

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// TTL for resolved documents, in seconds.
    pub doc_ttl_secs: u64,
    /// TTL for compacted lore slices, in seconds.
    pub slice_ttl_secs: u64,
    /// Bound on total cache entries.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            doc_ttl_secs: 3_600,
            slice_ttl_secs: 1_800,
            max_entries: 2_048,
        }
    }
}

/// Turn pipeline settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnSettings {
    /// Per-turn tool-call quota; calls beyond it get a denied stub.
    pub tool_call_quota: u32,
    /// Cap applied to world/adventure cast lists before harder drops.
    pub cast_caps: Vec<usize>,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            tool_call_quota: 2,
            cast_caps: vec![12, 8, 4],
        }
    }
}

/// Top-level engine settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Token budget settings.
    pub budgets: BudgetSettings,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Turn pipeline settings.
    pub turn: TurnSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = EngineSettings::default();
        assert_eq!(settings.budgets.max_input_tokens, 8_000);
        assert_eq!(settings.budgets.npc_floor, 5);
        assert_eq!(settings.cache.doc_ttl_secs, 3_600);
        assert_eq!(settings.cache.slice_ttl_secs, 1_800);
        assert_eq!(settings.turn.cast_caps, vec![12, 8, 4]);
    }

    #[test]
    fn partial_json_fills_from_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"budgets": {"maxInputTokens": 4000}}"#).unwrap();
        assert_eq!(settings.budgets.max_input_tokens, 4_000);
        assert_eq!(settings.budgets.max_output_tokens, 1_200);
        assert_eq!(settings.turn.tool_call_quota, 2);
    }
}
