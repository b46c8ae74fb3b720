//! The structured reply ("Awf") the model must produce each turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One menu choice offered to the player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Stable choice ID the client echoes back.
    pub id: String,
    /// Display label.
    pub label: String,
}

/// The validated structured reply for one turn.
///
/// `acts` stays a raw JSON array here: act-level parsing (including the
/// unknown-act fallback) belongs to the interpreter, not the reply schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Awf {
    /// Narrative text.
    pub txt: String,
    /// Menu choices, bounded by the contract's `max_choices`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// The acts array, exactly as produced.
    #[serde(default)]
    pub acts: Value,
    /// Scene hint for the client, if the model set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn awf_round_trips() {
        let awf = Awf {
            txt: "The gate creaks open.".into(),
            choices: vec![Choice {
                id: "c1".into(),
                label: "Step through".into(),
            }],
            acts: json!([{"t": "scene_set", "scene": "gatehouse"}]),
            scn: Some("gatehouse".into()),
        };
        let value = serde_json::to_value(&awf).unwrap();
        assert_eq!(value["txt"], "The gate creaks open.");
        let back: Awf = serde_json::from_value(value).unwrap();
        assert_eq!(back, awf);
    }
}
