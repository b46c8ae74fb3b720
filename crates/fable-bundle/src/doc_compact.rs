//! World/adventure document compaction.
//!
//! Three steps, in order:
//!
//! 1. **Locale overlay** — deep-merge the document's overlay for the session
//!    locale, if one exists, over the base document.
//! 2. **Projection** — map the document onto the bundle's [`CompactDoc`]
//!    allowlist; author-added top-level keys ride along in `custom`.
//! 3. **Token discipline** — if the projected view still exceeds its token
//!    ceiling, apply a fixed drop order, re-measuring after every step: cap
//!    the cast, elide synopsis and seasons, and finally drop the
//!    sub-document entirely.

use serde_json::Value;
use tracing::debug;

use fable_core::documents::{AdventureDoc, WorldDoc};
use fable_tokens::budget::{Reduction, ReductionKind};
use fable_tokens::estimator::estimate_json_tokens;

use crate::types::CompactDoc;

// ─────────────────────────────────────────────────────────────────────────────
// Locale overlay
// ─────────────────────────────────────────────────────────────────────────────

/// Deep-merge `overlay` over `base`. Objects merge recursively; everything
/// else replaces.
pub fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        let _ = base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Apply the locale overlay for `locale`, if the document defines one.
/// The overlaid document re-parses as `T`; a malformed overlay leaves the
/// base document untouched.
fn overlaid<T>(doc: &T, overlays: &std::collections::BTreeMap<String, Value>, locale: Option<&str>) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    let Some(overlay) = locale.and_then(|l| overlays.get(l)) else {
        return doc.clone();
    };
    let Ok(mut base) = serde_json::to_value(doc) else {
        return doc.clone();
    };
    merge_value(&mut base, overlay);
    match serde_json::from_value(base) {
        Ok(merged) => merged,
        Err(e) => {
            debug!(error = %e, "locale overlay produced an invalid document, keeping base");
            doc.clone()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projection
// ─────────────────────────────────────────────────────────────────────────────

/// Project a world document onto the compact view. Slices are attached
/// separately by the assembler.
#[must_use]
pub fn project_world(doc: &WorldDoc, locale: Option<&str>) -> CompactDoc {
    let doc = overlaid(doc, &doc.overlays, locale);
    CompactDoc {
        name: doc.name,
        synopsis: doc.synopsis,
        genre: doc.genre,
        tone: doc.tone,
        seasons: doc.seasons,
        cast: doc.cast,
        slices: Vec::new(),
        custom: doc.custom,
    }
}

/// Project an adventure document onto the compact view.
#[must_use]
pub fn project_adventure(doc: &AdventureDoc, locale: Option<&str>) -> CompactDoc {
    let doc = overlaid(doc, &doc.overlays, locale);
    CompactDoc {
        name: doc.name,
        synopsis: doc.synopsis,
        genre: None,
        tone: None,
        seasons: Vec::new(),
        cast: doc.cast,
        slices: Vec::new(),
        custom: doc.custom,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token discipline
// ─────────────────────────────────────────────────────────────────────────────

/// Bring a compact view under `max_tokens`, or drop it.
///
/// Returns `None` when even the fully elided view does not fit; the applied
/// reductions are recorded either way.
#[must_use]
pub fn discipline(
    label: &str,
    mut view: CompactDoc,
    max_tokens: u64,
    cast_caps: &[usize],
    reductions: &mut Vec<Reduction>,
) -> Option<CompactDoc> {
    let mut estimate = estimate_json_tokens(&view);
    if estimate <= max_tokens {
        return Some(view);
    }

    for &cap in cast_caps {
        if view.cast.len() <= cap {
            continue;
        }
        let dropped = view.cast.len() - cap;
        view.cast.truncate(cap);
        let after = estimate_json_tokens(&view);
        reductions.push(Reduction {
            kind: ReductionKind::CastCap,
            description: format!("{label}: capped cast at {cap} (dropped {dropped})"),
            tokens_saved: estimate.saturating_sub(after),
        });
        estimate = after;
        if estimate <= max_tokens {
            return Some(view);
        }
    }

    if view.synopsis.is_some() || !view.seasons.is_empty() {
        view.synopsis = None;
        view.seasons.clear();
        let after = estimate_json_tokens(&view);
        reductions.push(Reduction {
            kind: ReductionKind::FieldElide,
            description: format!("{label}: elided synopsis and seasons"),
            tokens_saved: estimate.saturating_sub(after),
        });
        estimate = after;
        if estimate <= max_tokens {
            return Some(view);
        }
    }

    reductions.push(Reduction {
        kind: ReductionKind::DocDrop,
        description: format!("{label}: dropped sub-document"),
        tokens_saved: estimate,
    });
    None
}
