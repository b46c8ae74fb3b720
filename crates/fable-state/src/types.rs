//! Game state: the three-tier document the act interpreter mutates.
//!
//! - `hot` — touched every turn: scene, time, relations, objectives, flags,
//!   resources
//! - `warm` — episodic memory under an eviction cap, plus pinned keys
//! - `cold` — long-term facts, rarely touched
//!
//! Collections use `BTreeMap`/`BTreeSet` so iteration order is deterministic;
//! the interpreter's idempotence property depends on it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fable_core::ids::{AdventureId, ScenarioId, SceneId, WorldId};

// ─────────────────────────────────────────────────────────────────────────────
// Time
// ─────────────────────────────────────────────────────────────────────────────

/// Named time-of-day band. Bands advance cyclically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    /// First band of the cycle.
    Dawn,
    /// Second band.
    Morning,
    /// Third band.
    Afternoon,
    /// Fourth band; rolls back into dawn.
    Evening,
}

impl TimeBand {
    /// The next band in the cyclic sequence.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Dawn => Self::Morning,
            Self::Morning => Self::Afternoon,
            Self::Afternoon => Self::Evening,
            Self::Evening => Self::Dawn,
        }
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        }
    }
}

impl std::fmt::Display for TimeBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current position within the day: band plus ticks accumulated inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTime {
    /// Current band.
    pub band: TimeBand,
    /// Ticks accumulated within the band, always `< band_ticks` after
    /// rollover.
    pub ticks: u32,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            band: TimeBand::Dawn,
            ticks: 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Objectives and memory
// ─────────────────────────────────────────────────────────────────────────────

/// Objective statuses the engine recognizes. Anything else is carried
/// verbatim and flagged as a violation at apply time.
pub const KNOWN_OBJECTIVE_STATUSES: &[&str] = &["open", "active", "done", "failed"];

/// One objective in the hot tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    /// Stable objective ID (upsert key).
    pub id: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Status tag; see [`KNOWN_OBJECTIVE_STATUSES`].
    pub status: String,
}

/// One episodic memory entry in the warm tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Caller-supplied key; unique within the episodic list.
    pub key: String,
    /// Note text, truncated deterministically at storage time.
    pub note: String,
    /// Importance in `[0, 1]`. Lower is evicted first.
    pub salience: f64,
    /// Turn index the entry was written on. Older evicts first at equal
    /// salience.
    pub turn: u64,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// Hot tier: mutated every turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotState {
    /// Current scene.
    pub scene: SceneId,
    /// Time of day.
    #[serde(default)]
    pub time: GameTime,
    /// NPC key → relation value on the contract's relation scale.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, i64>,
    /// Active objectives.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
    /// Narrative flags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, Value>,
    /// Resource key → amount.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, i64>,
}

/// Warm tier: episodic memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmState {
    /// Episodic entries, capped; eviction drops lowest `(salience, turn)`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodic: Vec<MemoryEntry>,
    /// Keys exempt from eviction.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pinned: BTreeSet<String>,
}

impl WarmState {
    /// Find an episodic entry by key.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&MemoryEntry> {
        self.episodic.iter().find(|e| e.key == key)
    }
}

/// Cold tier: long-term facts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdState {
    /// Fact key → value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facts: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GameState
// ─────────────────────────────────────────────────────────────────────────────

/// Turn kind, derived from the turn counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnKind {
    /// The opening turn; time must not advance.
    First,
    /// Any later turn; time must advance exactly once.
    Subsequent,
}

impl TurnKind {
    /// Derive the kind from a zero-based turn counter.
    #[must_use]
    pub fn from_turn(turn: u64) -> Self {
        if turn == 0 { Self::First } else { Self::Subsequent }
    }
}

/// The full three-tier game state for one session.
///
/// This document is the source of truth for world/adventure/scenario refs
/// and the current scene; the session may only override locale and ruleset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// World of record.
    pub world: WorldId,
    /// Adventure of record.
    pub adventure: AdventureId,
    /// Scenario (adventure start), if the session began from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioId>,
    /// Zero-based count of turns applied so far.
    #[serde(default)]
    pub turn: u64,
    /// Hot tier.
    #[serde(default)]
    pub hot: HotState,
    /// Warm tier.
    #[serde(default)]
    pub warm: WarmState,
    /// Cold tier.
    #[serde(default)]
    pub cold: ColdState,
}

impl GameState {
    /// The kind of the turn about to be applied on top of this state.
    #[must_use]
    pub fn turn_kind(&self) -> TurnKind {
        TurnKind::from_turn(self.turn)
    }
}
