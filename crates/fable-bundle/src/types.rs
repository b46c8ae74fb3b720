//! The bundle: the immutable per-turn snapshot sent to the model.
//!
//! Everything in here is a *view* — compacted, locale-overlaid projections of
//! the documents of record, never the documents themselves. The full NPC
//! document in particular never reaches the bundle; only the narration-safe
//! [`NpcView`] subset does.
//!
//! Top-level unknown keys land in `extras` so injection directives can add
//! fields the typed schema does not know about without breaking the round
//! trip through JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fable_core::documents::{CoreContract, PlayerProfile, RulesetDoc};
use fable_core::ids::{AdventureId, NpcId, ScenarioId, SceneId, TurnId, WorldId};
use fable_state::GameState;
use fable_tokens::budget::BudgetResult;

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// One compacted lore slice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceView {
    /// Slice name from the source document's lore map.
    pub name: String,
    /// Token-bounded summary text.
    pub summary: String,
    /// Extracted key points, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,
}

/// Compacted world/adventure view: the known-field allowlist plus a `custom`
/// bucket. Fields a world carries but an adventure does not stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactDoc {
    /// Display name.
    pub name: String,
    /// Synopsis; elided under token pressure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    /// Genre tag (worlds only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Narration tone (worlds only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Season descriptions; elided under token pressure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<String>,
    /// Cast, capped during compaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<NpcId>,
    /// Selected, compacted lore slices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slices: Vec<SliceView>,
    /// Author-added top-level keys, carried verbatim.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// Narration-safe NPC view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcView {
    /// NPC ID.
    pub id: NpcId,
    /// Display name.
    pub name: String,
    /// Archetype tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// One-paragraph summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Voice description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Speech register.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Trim priority; lower goes first under token pressure.
    #[serde(default)]
    pub priority: i32,
}

/// Active NPC section of the bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcSection {
    /// Bounded list of active NPC views. Empty is valid.
    #[serde(default)]
    pub active: Vec<NpcView>,
}

/// Scenario (adventure start) view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioView {
    /// Scenario ID.
    pub id: ScenarioId,
    /// Opening scene.
    pub scene: SceneId,
    /// Opening narration seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Meta / rng
// ─────────────────────────────────────────────────────────────────────────────

/// Budget ceilings stamped on the bundle for the provider to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStamp {
    /// Input ceiling this bundle was enforced against.
    pub max_input_tokens: u64,
    /// Output ceiling the provider must honor.
    pub max_output_tokens: u64,
}

/// Bundle metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    /// Engine version that built this bundle.
    pub engine_version: String,
    /// World of record.
    pub world: WorldId,
    /// Adventure of record.
    pub adventure: AdventureId,
    /// Unique ID of this turn.
    pub turn_id: TurnId,
    /// Zero-based turn index the state was at when assembly began.
    pub turn_index: u64,
    /// Whether this is the opening turn.
    pub is_first_turn: bool,
    /// Locale (BCP 47), if the session set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Budget ceilings.
    pub budgets: BudgetStamp,
}

/// Deterministic RNG seed and policy for the turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RngPolicy {
    /// Seed derived from `(session, turn index)`.
    pub seed: u64,
    /// Policy tag the model is asked to follow when it narrates chance.
    pub policy: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bundle
// ─────────────────────────────────────────────────────────────────────────────

/// The per-turn context bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Metadata.
    pub meta: BundleMeta,
    /// Immutable per-turn rules.
    pub contract: CoreContract,
    /// Pacing / narration ruleset.
    pub ruleset: RulesetDoc,
    /// Compacted world view; dropped entirely only under extreme pressure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<CompactDoc>,
    /// Compacted adventure view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adventure: Option<CompactDoc>,
    /// Scenario view, `null` when the session did not start from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioView>,
    /// Active NPCs.
    pub npcs: NpcSection,
    /// Player profile.
    pub player: PlayerProfile,
    /// Current game state.
    pub game_state: GameState,
    /// Deterministic RNG policy.
    pub rng: RngPolicy,
    /// Player input text for this turn.
    pub input: String,
    /// Injection-added top-level keys.
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

impl Bundle {
    /// Count of slices across world and adventure views.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        let world = self.world.as_ref().map_or(0, |d| d.slices.len());
        let adventure = self.adventure.as_ref().map_or(0, |d| d.slices.len());
        world + adventure
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly output
// ─────────────────────────────────────────────────────────────────────────────

/// Measured facts about one assembly pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleMetrics {
    /// Serialized bundle size in bytes.
    pub byte_size: usize,
    /// Final token estimate.
    pub estimated_tokens: u64,
    /// Active NPC count after enforcement.
    pub npc_count: usize,
    /// Slice count after enforcement.
    pub slice_count: usize,
    /// Wall time spent assembling, in milliseconds.
    pub build_ms: u64,
}

/// A fully assembled, budget-enforced bundle plus everything the orchestrator
/// needs to commit the turn later.
#[derive(Clone, Debug)]
pub struct Assembled {
    /// The bundle.
    pub bundle: Bundle,
    /// Budget cascade outcome.
    pub budget: BudgetResult,
    /// Assembly metrics.
    pub metrics: AssembleMetrics,
    /// Version of the game state the bundle was built from; 0 when no state
    /// existed yet. Passed through to the optimistic commit.
    pub state_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_round_trips_with_extras() {
        let bundle = Bundle {
            meta: BundleMeta {
                engine_version: "0.1.0".into(),
                world: "w-1".into(),
                adventure: "a-1".into(),
                turn_id: "t-1".into(),
                turn_index: 0,
                is_first_turn: true,
                locale: None,
                budgets: BudgetStamp {
                    max_input_tokens: 8_000,
                    max_output_tokens: 1_200,
                },
            },
            contract: CoreContract::default(),
            ruleset: RulesetDoc::default(),
            world: None,
            adventure: None,
            scenario: None,
            npcs: NpcSection::default(),
            player: PlayerProfile::default(),
            game_state: GameState {
                world: "w-1".into(),
                adventure: "a-1".into(),
                ..GameState::default()
            },
            rng: RngPolicy {
                seed: 7,
                policy: "narrative".into(),
            },
            input: "look around".into(),
            extras: [("pacingHint".to_owned(), json!("slow"))].into(),
        };

        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["pacingHint"], json!("slow"));
        assert_eq!(value["meta"]["isFirstTurn"], json!(true));

        let back: Bundle = serde_json::from_value(value).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn slice_count_sums_both_docs() {
        let slice = |name: &str| SliceView {
            name: name.into(),
            summary: "s".into(),
            key_points: vec![],
        };
        let mut world = CompactDoc::default();
        world.slices = vec![slice("a"), slice("b")];
        let mut adventure = CompactDoc::default();
        adventure.slices = vec![slice("c")];

        let mut bundle: Bundle = serde_json::from_value(serde_json::json!({
            "meta": {
                "engineVersion": "0.1.0",
                "world": "w-1",
                "adventure": "a-1",
                "turnId": "t-1",
                "turnIndex": 0,
                "isFirstTurn": true,
                "budgets": {"maxInputTokens": 8000, "maxOutputTokens": 1200},
            },
            "contract": CoreContract::default(),
            "ruleset": {"name": "default"},
            "npcs": {"active": []},
            "player": {"name": "Rel"},
            "gameState": {"world": "w-1", "adventure": "a-1"},
            "rng": {"seed": 1, "policy": "narrative"},
            "input": "",
        }))
        .unwrap();
        bundle.world = Some(world);
        bundle.adventure = Some(adventure);
        assert_eq!(bundle.slice_count(), 3);
    }
}
