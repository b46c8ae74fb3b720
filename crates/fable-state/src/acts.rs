//! The act vocabulary: typed, declarative state-mutation instructions.
//!
//! Acts arrive from the model as a JSON array of tagged objects
//! (`{"t": "relation_delta", ...}`). The vocabulary is a closed sum type:
//! adding an act kind is a compile-time-checked addition, and the
//! interpreter dispatches with a total match rather than a string-keyed
//! lookup table.
//!
//! Unrecognized or malformed entries parse into [`ParsedAct::Unknown`] so a
//! future act kind never aborts a turn; the interpreter records them as
//! violations and moves on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default salience for a memory entry that does not specify one.
fn default_salience() -> f64 {
    0.5
}

/// One typed mutation instruction.
///
/// The serialized tag (`t`) is the act-type string the contract's
/// `allowed_acts` list refers to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Act {
    /// Add a signed delta to an NPC relation, clamped to the relation scale.
    RelationDelta {
        /// NPC key.
        npc: String,
        /// Signed delta.
        delta: i64,
    },

    /// Insert or replace an objective by ID.
    ObjectiveUpsert {
        /// Objective ID (upsert key).
        id: String,
        /// Display title; kept from the existing entry when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// New status tag.
        status: String,
    },

    /// Set a narrative flag unconditionally.
    FlagSet {
        /// Flag key.
        key: String,
        /// Flag value.
        value: Value,
    },

    /// Add a signed delta to a resource, clamped to the resource scale.
    ResourceDelta {
        /// Resource key.
        key: String,
        /// Signed delta.
        delta: i64,
    },

    /// Replace the current scene. The prior scene is discarded; no history
    /// is kept at this layer.
    SceneSet {
        /// New scene ID.
        scene: String,
    },

    /// Advance time by `ticks`, rolling bands cyclically.
    /// `ticks < 1` is invalid and recorded as a violation.
    TimeAdvance {
        /// Ticks to add.
        ticks: i64,
    },

    /// Append an episodic memory entry, idempotent on the key.
    MemoryAdd {
        /// Entry key.
        key: String,
        /// Note text; truncated deterministically before storage.
        note: String,
        /// Importance in `[0, 1]`.
        #[serde(default = "default_salience")]
        salience: f64,
        /// Free-form tags.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },

    /// Add tags to an existing episodic entry.
    MemoryTag {
        /// Entry key.
        key: String,
        /// Tags to add (set semantics).
        tags: Vec<String>,
    },

    /// Remove an episodic entry by key.
    MemoryRemove {
        /// Entry key.
        key: String,
    },

    /// Pin a memory key, exempting it from eviction.
    PinAdd {
        /// Key to pin.
        key: String,
    },
}

impl Act {
    /// The serialized type tag for this act.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RelationDelta { .. } => "relation_delta",
            Self::ObjectiveUpsert { .. } => "objective_upsert",
            Self::FlagSet { .. } => "flag_set",
            Self::ResourceDelta { .. } => "resource_delta",
            Self::SceneSet { .. } => "scene_set",
            Self::TimeAdvance { .. } => "time_advance",
            Self::MemoryAdd { .. } => "memory_add",
            Self::MemoryTag { .. } => "memory_tag",
            Self::MemoryRemove { .. } => "memory_remove",
            Self::PinAdd { .. } => "pin_add",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing with unknown fallback
// ─────────────────────────────────────────────────────────────────────────────

/// A model-produced act after parsing: either a known instruction or an
/// entry the vocabulary does not recognize.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedAct {
    /// A well-formed act from the closed vocabulary.
    Known(Act),
    /// Unknown type tag or malformed fields. Recorded as a violation at
    /// apply time, never fatal.
    Unknown {
        /// The `t` tag if present, else `"<missing>"`.
        tag: String,
        /// The raw entry for the audit record.
        raw: Value,
    },
}

impl ParsedAct {
    /// Parse one act entry, falling back to [`ParsedAct::Unknown`].
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value::<Act>(value.clone()) {
            Ok(act) => Self::Known(act),
            Err(_) => Self::Unknown {
                tag: value
                    .get("t")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing>")
                    .to_owned(),
                raw: value.clone(),
            },
        }
    }

    /// Parse a whole acts array. A non-array value parses as empty.
    #[must_use]
    pub fn parse_all(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|entries| entries.iter().map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Whether this is a known [`Act::TimeAdvance`].
    #[must_use]
    pub fn is_time_advance(&self) -> bool {
        matches!(self, Self::Known(Act::TimeAdvance { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_act_parses() {
        let act = ParsedAct::from_value(&json!({"t": "relation_delta", "npc": "kael", "delta": -5}));
        assert_eq!(
            act,
            ParsedAct::Known(Act::RelationDelta {
                npc: "kael".into(),
                delta: -5
            })
        );
    }

    #[test]
    fn memory_add_defaults_salience() {
        let act = ParsedAct::from_value(&json!({
            "t": "memory_add", "key": "k", "note": "n"
        }));
        assert_eq!(
            act,
            ParsedAct::Known(Act::MemoryAdd {
                key: "k".into(),
                note: "n".into(),
                salience: 0.5,
                tags: vec![],
            })
        );
    }

    #[test]
    fn unknown_tag_falls_back() {
        let raw = json!({"t": "party_invite", "npc": "kael"});
        let act = ParsedAct::from_value(&raw);
        assert_eq!(
            act,
            ParsedAct::Unknown {
                tag: "party_invite".into(),
                raw,
            }
        );
    }

    #[test]
    fn malformed_fields_fall_back() {
        // delta must be a number
        let raw = json!({"t": "relation_delta", "npc": "kael", "delta": "much"});
        assert!(matches!(
            ParsedAct::from_value(&raw),
            ParsedAct::Unknown { tag, .. } if tag == "relation_delta"
        ));
    }

    #[test]
    fn missing_tag_is_marked() {
        let raw = json!({"npc": "kael"});
        assert!(matches!(
            ParsedAct::from_value(&raw),
            ParsedAct::Unknown { tag, .. } if tag == "<missing>"
        ));
    }

    #[test]
    fn parse_all_handles_non_array() {
        assert!(ParsedAct::parse_all(&json!("nope")).is_empty());
        assert_eq!(
            ParsedAct::parse_all(&json!([{"t": "scene_set", "scene": "docks"}])).len(),
            1
        );
    }

    #[test]
    fn tags_round_trip_serialization() {
        let act = Act::TimeAdvance { ticks: 20 };
        let json = serde_json::to_value(&act).unwrap();
        assert_eq!(json["t"], "time_advance");
        assert_eq!(act.tag(), "time_advance");
    }
}
