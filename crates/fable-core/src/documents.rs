//! Versioned document model and repository contracts.
//!
//! Every document of record is wrapped in a [`VersionedDoc`] envelope carrying
//! its ID, monotonically increasing version, and a content hash. Cache keys
//! incorporate the hash, so editing a document invalidates exactly the cache
//! entries derived from it.
//!
//! World and adventure documents are **forward compatible**: known fields are
//! typed, everything else lands in a `custom` bucket via `#[serde(flatten)]`.
//! Unknown top-level keys survive a round trip untouched.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ids::{NpcId, RulesetId, SceneId};

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A document of record with version and content hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedDoc<T> {
    /// Document ID within its kind.
    pub id: String,
    /// Monotonically increasing version.
    pub version: u64,
    /// Hex SHA-256 of the canonical serialized content.
    pub hash: String,
    /// The document body.
    pub doc: T,
}

impl<T: Serialize> VersionedDoc<T> {
    /// Wrap a document, computing its content hash.
    pub fn new(id: impl Into<String>, version: u64, doc: T) -> Self {
        let hash = content_hash_of(&doc);
        Self {
            id: id.into(),
            version,
            hash,
            doc,
        }
    }
}

/// Hex SHA-256 of a serialized value.
///
/// `serde_json` preserves struct field order and `BTreeMap` key order, so
/// structurally identical documents hash identically.
#[must_use]
pub fn content_hash_of<T: Serialize>(doc: &T) -> String {
    let bytes = serde_json::to_vec(doc).unwrap_or_default();
    content_hash_bytes(&bytes)
}

/// Hex SHA-256 of raw bytes.
#[must_use]
pub fn content_hash_bytes(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// World / Adventure documents
// ─────────────────────────────────────────────────────────────────────────────

/// A world document.
///
/// Known fields are typed; arbitrary author-added keys collect in `custom`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDoc {
    /// Display name.
    pub name: String,
    /// Free-text synopsis. First candidate for elision under token pressure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    /// Genre tag (e.g. `"noir"`, `"high-fantasy"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Narration tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Season/era descriptions. Elidable under token pressure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<String>,
    /// Recurring cast, capped hard during compaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<NpcId>,
    /// Named lore slices: slice name → lore text.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lore: BTreeMap<String, String>,
    /// Scene-keyed slice selection: scene ID → slice names.
    /// Scenes without an entry fall back to `default_slices`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slice_policy: BTreeMap<String, Vec<String>>,
    /// Document-wide default slice list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_slices: Vec<String>,
    /// Locale overlays: locale tag → partial document to deep-merge.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overlays: BTreeMap<String, Value>,
    /// Unknown top-level keys, preserved round-trip.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// An adventure document. Same forward-compatible shape as [`WorldDoc`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdventureDoc {
    /// Display name.
    pub name: String,
    /// Free-text synopsis. Elidable under token pressure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    /// Adventure cast, capped hard during compaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<NpcId>,
    /// Named lore slices.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lore: BTreeMap<String, String>,
    /// Scene-keyed slice selection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slice_policy: BTreeMap<String, Vec<String>>,
    /// Document-wide default slice list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_slices: Vec<String>,
    /// Locale overlays.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overlays: BTreeMap<String, Value>,
    /// Unknown top-level keys, preserved round-trip.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// An adventure-start (scenario) document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdventureStartDoc {
    /// Opening scene.
    pub scene: SceneId,
    /// Opening narration seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
    /// NPCs present at the start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub npc_refs: Vec<NpcId>,
    /// Unknown top-level keys.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// NPC document
// ─────────────────────────────────────────────────────────────────────────────

/// A full NPC document of record.
///
/// Only a narration-safe subset ever reaches the bundle; the rest stays here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcDoc {
    /// Display name.
    pub name: String,
    /// Archetype tag (e.g. `"mentor"`, `"rival"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// One-paragraph narration summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Voice description for narration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Speech register (e.g. `"formal"`, `"street"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Relative priority for budget trimming; higher survives longer.
    #[serde(default)]
    pub priority: i32,
    /// Unknown top-level keys (stat blocks, secrets, schedules, ...).
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session / contract / ruleset / injection map
// ─────────────────────────────────────────────────────────────────────────────

/// Player profile carried on the session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    /// Player character name.
    pub name: String,
    /// Named traits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub traits: BTreeMap<String, Value>,
    /// Skill name → value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skills: BTreeMap<String, i64>,
    /// Inventory item names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory: Vec<String>,
}

/// A player session document.
///
/// The game state is the source of truth for world/adventure refs and scene;
/// the session may only override locale and ruleset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDoc {
    /// Locale override (BCP 47 tag), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Ruleset override, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<RulesetId>,
    /// The player behind this session.
    #[serde(default)]
    pub player: PlayerProfile,
}

/// Numeric scale bounds for relation/skill style values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleBounds {
    /// Inclusive minimum.
    pub min: i64,
    /// Inclusive maximum.
    pub max: i64,
    /// Value assumed when a key has never been written.
    pub baseline: i64,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min: 0,
            max: 100,
            baseline: 50,
        }
    }
}

impl ScaleBounds {
    /// Clamp a value into the scale.
    #[must_use]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    /// Default bounds for resources: non-negative, baseline 0.
    #[must_use]
    pub fn resources() -> Self {
        Self {
            min: 0,
            max: 1_000_000_000,
            baseline: 0,
        }
    }
}

/// The core contract: immutable per-turn rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreContract {
    /// Allowed act type tags for this contract version.
    pub allowed_acts: Vec<String>,
    /// Keys the structured reply must carry.
    pub required_keys: Vec<String>,
    /// Keys the structured reply may carry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_keys: Vec<String>,
    /// Maximum number of menu choices in a reply.
    pub max_choices: usize,
    /// Relation scale bounds.
    #[serde(default)]
    pub relation_scale: ScaleBounds,
    /// Resource scale bounds (baseline 0, non-negative by default).
    #[serde(default = "ScaleBounds::resources")]
    pub resource_scale: ScaleBounds,
    /// Episodic memory cap.
    pub episodic_cap: usize,
    /// Tick capacity of each time-of-day band.
    pub band_ticks: u32,
    /// Maximum stored length of an episodic note, in characters.
    pub note_max_chars: usize,
}

impl Default for CoreContract {
    fn default() -> Self {
        Self {
            allowed_acts: vec![
                "relation_delta".into(),
                "objective_upsert".into(),
                "flag_set".into(),
                "resource_delta".into(),
                "scene_set".into(),
                "time_advance".into(),
                "memory_add".into(),
                "memory_tag".into(),
                "memory_remove".into(),
                "pin_add".into(),
            ],
            required_keys: vec!["txt".into(), "acts".into()],
            optional_keys: vec!["choices".into(), "scn".into()],
            max_choices: 4,
            relation_scale: ScaleBounds::default(),
            resource_scale: ScaleBounds::resources(),
            episodic_cap: 60,
            band_ticks: 60,
            note_max_chars: 280,
        }
    }
}

/// A pacing / narration ruleset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetDoc {
    /// Display name.
    pub name: String,
    /// Pacing policy tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<String>,
    /// Narration style directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    /// NPCs this ruleset always keeps in play.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub npc_refs: Vec<NpcId>,
    /// Unknown top-level keys.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// One injection directive: copy a value from a resolved document into the
/// bundle at a JSON pointer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionDirective {
    /// Dotted source path rooted at the resolved-document set,
    /// e.g. `"world.tone"` or `"ruleset.pacing"`.
    pub source: String,
    /// Target JSON pointer into the bundle, e.g. `"/ruleset/pacing"`.
    pub target: String,
}

/// The injection map: ordered build directives for the bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionMapDoc {
    /// Directives, applied in order.
    #[serde(default)]
    pub directives: Vec<InjectionDirective>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository contract
// ─────────────────────────────────────────────────────────────────────────────

/// Repository failure (storage backends are collaborators, not modeled here).
#[derive(Debug, Error)]
#[error("repository error: {0}")]
pub struct RepoError(pub String);

/// Read-side repository contract for one document kind.
///
/// All documents are versioned and content-hashed; a changed hash must
/// invalidate cache entries keyed on it.
#[async_trait]
pub trait DocRepository<T: DeserializeOwned + Send + Sync>: Send + Sync {
    /// Resolve a document by ID, optionally pinned to a version.
    /// `None` version means "latest".
    async fn get_by_id_version(
        &self,
        id: &str,
        version: Option<u64>,
    ) -> Result<Option<VersionedDoc<T>>, RepoError>;

    /// Resolve the active document for an optional scope (e.g. the active
    /// core contract).
    async fn get_active(&self, scope: Option<&str>) -> Result<Option<VersionedDoc<T>>, RepoError>;

    /// Batched multi-ID lookup. Missing IDs are silently absent from the
    /// result; order follows the input where present.
    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<VersionedDoc<T>>, RepoError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = WorldDoc {
            name: "Vhelm".into(),
            ..WorldDoc::default()
        };
        let b = a.clone();
        assert_eq!(content_hash_of(&a), content_hash_of(&b));
    }

    #[test]
    fn content_hash_changes_with_content() {
        let a = WorldDoc {
            name: "Vhelm".into(),
            ..WorldDoc::default()
        };
        let mut b = a.clone();
        b.tone = Some("grim".into());
        assert_ne!(content_hash_of(&a), content_hash_of(&b));
    }

    #[test]
    fn versioned_doc_hashes_on_construction() {
        let doc = VersionedDoc::new("w-1", 3, WorldDoc::default());
        assert_eq!(doc.version, 3);
        assert_eq!(doc.hash, content_hash_of(&WorldDoc::default()));
    }

    #[test]
    fn world_doc_preserves_unknown_keys() {
        let json = serde_json::json!({
            "name": "Vhelm",
            "tone": "grim",
            "factionLadder": ["crows", "lamps"],
        });
        let doc: WorldDoc = serde_json::from_value(json).unwrap();
        assert_eq!(doc.name, "Vhelm");
        assert_eq!(
            doc.custom.get("factionLadder"),
            Some(&serde_json::json!(["crows", "lamps"]))
        );

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["factionLadder"], serde_json::json!(["crows", "lamps"]));
    }

    #[test]
    fn scale_bounds_clamp() {
        let scale = ScaleBounds::default();
        assert_eq!(scale.clamp(-40), 0);
        assert_eq!(scale.clamp(140), 100);
        assert_eq!(scale.clamp(77), 77);
    }

    #[test]
    fn contract_default_allows_closed_vocabulary() {
        let contract = CoreContract::default();
        assert!(contract.allowed_acts.contains(&"time_advance".to_string()));
        assert_eq!(contract.episodic_cap, 60);
        assert_eq!(contract.band_ticks, 60);
    }

    #[test]
    fn npc_doc_defaults_are_narration_light() {
        let npc: NpcDoc = serde_json::from_value(serde_json::json!({
            "name": "Kael",
            "statBlock": { "str": 12 },
        }))
        .unwrap();
        assert_eq!(npc.name, "Kael");
        assert_eq!(npc.priority, 0);
        assert!(npc.custom.contains_key("statBlock"));
    }
}
