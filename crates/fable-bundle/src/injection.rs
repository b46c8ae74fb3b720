//! Injection map execution.
//!
//! The injection map decouples the bundle schema from document-of-record
//! schemas: each directive copies a value from the resolved-document set
//! (addressed by a dotted source path like `"world.tone"`) into the bundle
//! at a JSON pointer target like `"/ruleset/pacing"`.
//!
//! Directives run in order. A directive that cannot resolve its source or
//! write its target is logged and skipped; injection is never fatal and the
//! bundle stays usable with its defaults.

use serde_json::Value;
use tracing::warn;

use fable_core::documents::InjectionMapDoc;

/// Outcome counts of one injection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Directives applied.
    pub applied: u32,
    /// Directives skipped (unresolvable source or unwritable target).
    pub skipped: u32,
}

/// Execute the injection map against the serialized bundle.
///
/// `sources` is an object keyed by resolved-document name (`session`,
/// `ruleset`, `world`, `adventure`, `adventureStart`, `contract`,
/// `gameState`).
pub fn apply_injection_map(
    bundle: &mut Value,
    sources: &Value,
    map: &InjectionMapDoc,
) -> InjectionReport {
    let mut report = InjectionReport::default();

    for directive in &map.directives {
        let Some(value) = lookup_source(sources, &directive.source) else {
            warn!(
                source = %directive.source,
                target = %directive.target,
                "injection source did not resolve, skipping directive"
            );
            report.skipped += 1;
            continue;
        };
        if write_pointer(bundle, &directive.target, value.clone()) {
            report.applied += 1;
        } else {
            warn!(
                source = %directive.source,
                target = %directive.target,
                "injection target not writable, skipping directive"
            );
            report.skipped += 1;
        }
    }

    report
}

/// Resolve a dotted path (`"world.lore.docks"`) inside the source set.
fn lookup_source<'a>(sources: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(sources, |value, segment| value.get(segment))
}

/// Write `value` at a JSON pointer, creating intermediate objects along the
/// way. Returns `false` when the pointer is malformed or crosses a
/// non-object.
fn write_pointer(root: &mut Value, pointer: &str, value: Value) -> bool {
    if pointer.is_empty() || !pointer.starts_with('/') {
        return false;
    }
    let segments: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut cursor = root;
    for segment in parents {
        let Value::Object(map) = cursor else {
            return false;
        };
        cursor = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    match cursor {
        Value::Object(map) => {
            let _ = map.insert(last.clone(), value);
            true
        }
        _ => false,
    }
}
