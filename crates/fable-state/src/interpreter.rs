//! The act interpreter: contract validation and act application.
//!
//! Two layers, matching the fatal/non-fatal split:
//!
//! 1. **Contract validation** runs before any mutation. A broken first- or
//!    subsequent-turn rule aborts the whole turn with
//!    [`TurnError::ContractViolation`]; the prior state is untouched.
//! 2. **Application** walks the acts in order through a total match over the
//!    vocabulary. Per-act problems (unknown types, disallowed types, missing
//!    keys, invalid ticks) are recorded in [`ApplySummary::violations`] and
//!    never abort the pass.
//!
//! [`apply_acts`] is a pure function of its inputs: no clock, no RNG, no
//! hidden state. Applying the same acts to structurally identical prior
//! states yields identical new states and summaries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fable_core::documents::CoreContract;
use fable_core::errors::{TurnError, TurnResult};

use crate::acts::{Act, ParsedAct};
use crate::types::{
    GameState, GameTime, KNOWN_OBJECTIVE_STATUSES, MemoryEntry, Objective, TurnKind,
};

// ─────────────────────────────────────────────────────────────────────────────
// Summary types
// ─────────────────────────────────────────────────────────────────────────────

/// One relation change in the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationChange {
    /// NPC key.
    pub key: String,
    /// Requested delta.
    pub delta: i64,
    /// Stored value after clamping.
    pub new_val: i64,
}

/// One objective transition in the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveTransition {
    /// Objective ID.
    pub id: String,
    /// Status before the upsert, if the objective existed.
    pub prev_status: Option<String>,
    /// Status after the upsert.
    pub next_status: String,
}

/// One resource change in the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    /// Resource key.
    pub key: String,
    /// Requested delta.
    pub delta: i64,
    /// Stored value after clamping.
    pub new_val: i64,
}

/// Scene replacement recorded by the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTransition {
    /// Scene before.
    pub prev: String,
    /// Scene after.
    pub next: String,
}

/// Time-band transition recorded by the summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandTransition {
    /// Time before the advance.
    pub prev: GameTime,
    /// Time after the advance and rollover.
    pub next: GameTime,
}

/// A non-fatal per-act problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Index of the offending act in the input array.
    pub index: usize,
    /// Machine-readable code, e.g. `"unknown_act"`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Audit record of one act-application pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    /// Relation changes, in act order.
    pub relation_changes: Vec<RelationChange>,
    /// Objective transitions, in act order.
    pub objective_transitions: Vec<ObjectiveTransition>,
    /// Flag keys written.
    pub flags_touched: Vec<String>,
    /// Resource changes, in act order.
    pub resource_deltas: Vec<ResourceChange>,
    /// Scene replacement, if any.
    pub scene_transition: Option<SceneTransition>,
    /// Time-band transition, if time advanced.
    pub time_transition: Option<BandTransition>,
    /// Episodic entries written (inserted or refreshed).
    pub memory_added: u32,
    /// Keys newly pinned.
    pub memory_pinned: u32,
    /// Entries evicted to hold the cap.
    pub memory_trimmed: u32,
    /// Entries tagged.
    pub memory_tagged: u32,
    /// Entries removed.
    pub memory_removed: u32,
    /// Non-fatal per-act problems.
    pub violations: Vec<Violation>,
}

/// Result of a successful apply pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplyOutcome {
    /// The new state, ready to commit.
    pub state: GameState,
    /// Audit summary.
    pub summary: ApplySummary,
}

// ─────────────────────────────────────────────────────────────────────────────
// Contract validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate the first/subsequent-turn act-shape rules.
///
/// Runs before any mutation. Violation aborts the whole turn.
pub fn validate_contract(acts: &[ParsedAct], kind: TurnKind) -> TurnResult<()> {
    let time_advances = acts.iter().filter(|a| a.is_time_advance()).count();

    match kind {
        TurnKind::First if time_advances > 0 => Err(TurnError::contract(
            "time_advance_forbidden",
            format!("first turn carries {time_advances} TIME_ADVANCE act(s); none allowed"),
        )),
        TurnKind::Subsequent if time_advances != 1 => Err(TurnError::contract(
            "time_advance_required",
            format!("subsequent turn carries {time_advances} TIME_ADVANCE act(s); exactly 1 required"),
        )),
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application
// ─────────────────────────────────────────────────────────────────────────────

/// Apply a validated acts array to the prior state.
///
/// Pure: the outcome depends only on `(acts, prior, contract)`. The turn
/// counter increments by one; the turn kind is derived from `prior.turn`.
pub fn apply_acts(
    acts: &[ParsedAct],
    prior: &GameState,
    contract: &CoreContract,
) -> TurnResult<ApplyOutcome> {
    let kind = prior.turn_kind();
    validate_contract(acts, kind)?;

    let mut state = prior.clone();
    state.turn = prior.turn + 1;
    // Entries written this pass carry the index of the turn being applied.
    let current_turn = state.turn;

    let mut summary = ApplySummary::default();

    for (index, parsed) in acts.iter().enumerate() {
        let act = match parsed {
            ParsedAct::Known(act) => act,
            ParsedAct::Unknown { tag, .. } => {
                debug!(index, tag = %tag, "skipping unrecognized act");
                summary.violations.push(Violation {
                    index,
                    code: "unknown_act".into(),
                    message: format!("unrecognized or malformed act type '{tag}'"),
                });
                continue;
            }
        };

        if !contract.allowed_acts.iter().any(|t| t == act.tag()) {
            debug!(index, act = act.tag(), "skipping act outside the allowed set");
            summary.violations.push(Violation {
                index,
                code: "act_not_allowed".into(),
                message: format!("act type '{}' is not in the contract's allowed set", act.tag()),
            });
            continue;
        }

        apply_one(act, index, &mut state, contract, current_turn, &mut summary);
    }

    Ok(ApplyOutcome { state, summary })
}

/// Dispatch one act. Total match: adding a vocabulary variant without a
/// handler is a compile error.
fn apply_one(
    act: &Act,
    index: usize,
    state: &mut GameState,
    contract: &CoreContract,
    current_turn: u64,
    summary: &mut ApplySummary,
) {
    match act {
        Act::RelationDelta { npc, delta } => {
            let scale = contract.relation_scale;
            let current = state
                .hot
                .relations
                .get(npc)
                .copied()
                .unwrap_or(scale.baseline);
            let new_val = scale.clamp(current.saturating_add(*delta));
            let _ = state.hot.relations.insert(npc.clone(), new_val);
            summary.relation_changes.push(RelationChange {
                key: npc.clone(),
                delta: *delta,
                new_val,
            });
        }

        Act::ObjectiveUpsert { id, title, status } => {
            if !KNOWN_OBJECTIVE_STATUSES.contains(&status.as_str()) {
                summary.violations.push(Violation {
                    index,
                    code: "unknown_status".into(),
                    message: format!("objective '{id}' given unrecognized status '{status}'"),
                });
            }
            let existing = state.hot.objectives.iter_mut().find(|o| o.id == *id);
            let prev_status = match existing {
                Some(entry) => {
                    let prev = entry.status.clone();
                    entry.status = status.clone();
                    if title.is_some() {
                        entry.title = title.clone();
                    }
                    Some(prev)
                }
                None => {
                    state.hot.objectives.push(Objective {
                        id: id.clone(),
                        title: title.clone(),
                        status: status.clone(),
                    });
                    None
                }
            };
            summary.objective_transitions.push(ObjectiveTransition {
                id: id.clone(),
                prev_status,
                next_status: status.clone(),
            });
        }

        Act::FlagSet { key, value } => {
            let _ = state.hot.flags.insert(key.clone(), value.clone());
            summary.flags_touched.push(key.clone());
        }

        Act::ResourceDelta { key, delta } => {
            let scale = contract.resource_scale;
            let current = state
                .hot
                .resources
                .get(key)
                .copied()
                .unwrap_or(scale.baseline);
            let new_val = scale.clamp(current.saturating_add(*delta));
            let _ = state.hot.resources.insert(key.clone(), new_val);
            summary.resource_deltas.push(ResourceChange {
                key: key.clone(),
                delta: *delta,
                new_val,
            });
        }

        Act::SceneSet { scene } => {
            let prev = state.hot.scene.to_string();
            state.hot.scene = scene.as_str().into();
            summary.scene_transition = Some(SceneTransition {
                prev,
                next: scene.clone(),
            });
        }

        Act::TimeAdvance { ticks } => {
            if *ticks < 1 {
                summary.violations.push(Violation {
                    index,
                    code: "invalid_ticks".into(),
                    message: format!("time advance of {ticks} tick(s); minimum is 1"),
                });
                return;
            }
            let prev = state.hot.time;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let next = advance_time(prev, *ticks as u64, contract.band_ticks);
            state.hot.time = next;
            summary.time_transition = Some(BandTransition { prev, next });
        }

        Act::MemoryAdd {
            key,
            note,
            salience,
            tags,
        } => {
            let entry = MemoryEntry {
                key: key.clone(),
                note: truncate_note(note, contract.note_max_chars),
                salience: salience.clamp(0.0, 1.0),
                turn: current_turn,
                tags: tags.clone(),
            };
            // Idempotent on key: a repeated identical key refreshes in place
            // instead of accumulating duplicates.
            match state.warm.episodic.iter_mut().find(|e| e.key == *key) {
                Some(existing) => *existing = entry,
                None => state.warm.episodic.push(entry),
            }
            summary.memory_added += 1;
            summary.memory_trimmed += evict_episodic(state, contract.episodic_cap);
        }

        Act::MemoryTag { key, tags } => {
            match state.warm.episodic.iter_mut().find(|e| e.key == *key) {
                Some(entry) => {
                    for tag in tags {
                        if !entry.tags.contains(tag) {
                            entry.tags.push(tag.clone());
                        }
                    }
                    summary.memory_tagged += 1;
                }
                None => summary.violations.push(Violation {
                    index,
                    code: "missing_key".into(),
                    message: format!("memory tag targets absent key '{key}'"),
                }),
            }
        }

        Act::MemoryRemove { key } => {
            let before = state.warm.episodic.len();
            state.warm.episodic.retain(|e| e.key != *key);
            if state.warm.episodic.len() < before {
                // Dropping the entry also drops its pin; a dangling pin
                // would silently shield a future entry under the same key.
                let _ = state.warm.pinned.remove(key);
                summary.memory_removed += 1;
            } else {
                summary.violations.push(Violation {
                    index,
                    code: "missing_key".into(),
                    message: format!("memory remove targets absent key '{key}'"),
                });
            }
        }

        Act::PinAdd { key } => {
            if state.warm.pinned.insert(key.clone()) {
                summary.memory_pinned += 1;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Add ticks and roll bands cyclically while the accumulated ticks reach the
/// band capacity.
fn advance_time(time: GameTime, ticks: u64, band_ticks: u32) -> GameTime {
    let capacity = u64::from(band_ticks.max(1));
    let mut band = time.band;
    let mut total = u64::from(time.ticks) + ticks;
    while total >= capacity {
        total -= capacity;
        band = band.next();
    }
    #[allow(clippy::cast_possible_truncation)]
    GameTime {
        band,
        ticks: total as u32,
    }
}

/// Deterministic note truncation: at most `max_chars` characters, ellipsis
/// included when anything was cut.
fn truncate_note(note: &str, max_chars: usize) -> String {
    if note.chars().count() <= max_chars {
        return note.to_owned();
    }
    let kept: String = note.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Evict unpinned entries with the lowest `(salience, turn)` until the
/// episodic list is back at the cap. Returns the number evicted.
#[allow(clippy::cast_possible_truncation)]
fn evict_episodic(state: &mut GameState, cap: usize) -> u32 {
    let mut trimmed = 0u32;
    while state.warm.episodic.len() > cap {
        let victim = state
            .warm
            .episodic
            .iter()
            .enumerate()
            .filter(|(_, e)| !state.warm.pinned.contains(&e.key))
            .min_by(|(_, a), (_, b)| {
                a.salience
                    .total_cmp(&b.salience)
                    .then_with(|| a.turn.cmp(&b.turn))
            })
            .map(|(i, _)| i);
        match victim {
            Some(i) => {
                let _ = state.warm.episodic.remove(i);
                trimmed += 1;
            }
            // Everything over the cap is pinned; nothing more to trim.
            None => break,
        }
    }
    trimmed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TimeBand, WarmState};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn contract() -> CoreContract {
        CoreContract::default()
    }

    fn first_turn_state() -> GameState {
        GameState {
            world: "w-1".into(),
            adventure: "a-1".into(),
            ..GameState::default()
        }
    }

    fn subsequent_state() -> GameState {
        GameState {
            turn: 4,
            ..first_turn_state()
        }
    }

    fn known(act: Act) -> ParsedAct {
        ParsedAct::Known(act)
    }

    fn time_advance(ticks: i64) -> ParsedAct {
        known(Act::TimeAdvance { ticks })
    }

    // -- Contract rules --

    #[test]
    fn first_turn_rejects_time_advance() {
        let prior = first_turn_state();
        let err = apply_acts(&[time_advance(10)], &prior, &contract()).unwrap_err();
        assert_matches!(err, TurnError::ContractViolation { rule, .. } if rule == "time_advance_forbidden");
    }

    #[test]
    fn first_turn_without_time_advance_passes() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[known(Act::SceneSet {
                scene: "docks".into(),
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.turn, 1);
    }

    #[test]
    fn subsequent_turn_requires_exactly_one_time_advance() {
        let prior = subsequent_state();

        let none = apply_acts(&[], &prior, &contract()).unwrap_err();
        assert_matches!(none, TurnError::ContractViolation { rule, .. } if rule == "time_advance_required");

        let two = apply_acts(&[time_advance(5), time_advance(5)], &prior, &contract()).unwrap_err();
        assert_matches!(two, TurnError::ContractViolation { .. });

        let one = apply_acts(&[time_advance(5)], &prior, &contract());
        assert!(one.is_ok());
    }

    #[test]
    fn contract_violation_leaves_prior_untouched() {
        let prior = subsequent_state();
        let before = prior.clone();
        let _ = apply_acts(&[], &prior, &contract()).unwrap_err();
        assert_eq!(prior, before);
    }

    // -- Time --

    #[test]
    fn band_rollover() {
        let mut prior = subsequent_state();
        prior.hot.time = GameTime {
            band: TimeBand::Dawn,
            ticks: 50,
        };
        let outcome = apply_acts(&[time_advance(20)], &prior, &contract()).unwrap();
        assert_eq!(outcome.state.hot.time.band, TimeBand::Morning);
        assert_eq!(outcome.state.hot.time.ticks, 10);

        let transition = outcome.summary.time_transition.unwrap();
        assert_eq!(transition.prev.band, TimeBand::Dawn);
        assert_eq!(transition.next.band, TimeBand::Morning);
    }

    #[test]
    fn band_rollover_wraps_full_cycle() {
        let mut prior = subsequent_state();
        prior.hot.time = GameTime {
            band: TimeBand::Evening,
            ticks: 0,
        };
        // 4 bands * 60 ticks = one full day back to Evening.
        let outcome = apply_acts(&[time_advance(240)], &prior, &contract()).unwrap();
        assert_eq!(outcome.state.hot.time.band, TimeBand::Evening);
        assert_eq!(outcome.state.hot.time.ticks, 0);
    }

    #[test]
    fn zero_ticks_is_a_violation_not_an_abort() {
        let prior = subsequent_state();
        let outcome = apply_acts(&[time_advance(0)], &prior, &contract()).unwrap();
        assert_eq!(outcome.summary.violations.len(), 1);
        assert_eq!(outcome.summary.violations[0].code, "invalid_ticks");
        assert_eq!(outcome.state.hot.time, prior.hot.time);
    }

    // -- Relations --

    #[test]
    fn relation_delta_clamps_to_scale() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[
                known(Act::RelationDelta {
                    npc: "kael".into(),
                    delta: 500,
                }),
                known(Act::RelationDelta {
                    npc: "mira".into(),
                    delta: -500,
                }),
            ],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.relations["kael"], 100);
        assert_eq!(outcome.state.hot.relations["mira"], 0);
        assert_eq!(outcome.summary.relation_changes[0].new_val, 100);
    }

    #[test]
    fn relation_delta_starts_from_baseline() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[known(Act::RelationDelta {
                npc: "kael".into(),
                delta: 7,
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.relations["kael"], 57);
    }

    // -- Objectives --

    #[test]
    fn objective_upsert_inserts_then_replaces() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[
                known(Act::ObjectiveUpsert {
                    id: "find-ledger".into(),
                    title: Some("Find the ledger".into()),
                    status: "open".into(),
                }),
                known(Act::ObjectiveUpsert {
                    id: "find-ledger".into(),
                    title: None,
                    status: "done".into(),
                }),
            ],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.objectives.len(), 1);
        assert_eq!(outcome.state.hot.objectives[0].status, "done");
        assert_eq!(
            outcome.summary.objective_transitions[1].prev_status.as_deref(),
            Some("open")
        );
    }

    #[test]
    fn unknown_objective_status_is_violation_but_applies() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[known(Act::ObjectiveUpsert {
                id: "o1".into(),
                title: None,
                status: "paused".into(),
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.summary.violations[0].code, "unknown_status");
        assert_eq!(outcome.state.hot.objectives[0].status, "paused");
    }

    // -- Flags, resources, scene --

    #[test]
    fn flag_set_overwrites() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[
                known(Act::FlagSet {
                    key: "gate_open".into(),
                    value: json!(true),
                }),
                known(Act::FlagSet {
                    key: "gate_open".into(),
                    value: json!(false),
                }),
            ],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.flags["gate_open"], json!(false));
        assert_eq!(outcome.summary.flags_touched, vec!["gate_open", "gate_open"]);
    }

    #[test]
    fn resource_delta_clamps_at_zero() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[known(Act::ResourceDelta {
                key: "coin".into(),
                delta: -30,
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.resources["coin"], 0);
    }

    #[test]
    fn scene_set_discards_prior() {
        let mut prior = first_turn_state();
        prior.hot.scene = "market".into();
        let outcome = apply_acts(
            &[known(Act::SceneSet {
                scene: "docks".into(),
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.hot.scene.as_str(), "docks");
        let transition = outcome.summary.scene_transition.unwrap();
        assert_eq!(transition.prev, "market");
        assert_eq!(transition.next, "docks");
    }

    // -- Memory --

    fn memory_add(key: &str, salience: f64) -> ParsedAct {
        known(Act::MemoryAdd {
            key: key.into(),
            note: format!("note for {key}"),
            salience,
            tags: vec![],
        })
    }

    #[test]
    fn memory_add_is_idempotent_on_key() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[memory_add("met-kael", 0.6), memory_add("met-kael", 0.6)],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.warm.episodic.len(), 1);
    }

    #[test]
    fn eviction_trims_back_to_cap() {
        let mut prior = subsequent_state();
        for i in 0..70 {
            prior.warm.episodic.push(MemoryEntry {
                key: format!("m{i}"),
                note: "old".into(),
                salience: 0.9,
                turn: i,
                tags: vec![],
            });
        }
        let outcome = apply_acts(
            &[time_advance(1), memory_add("fresh", 1.0)],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.warm.episodic.len(), 60);
        assert_eq!(outcome.summary.memory_trimmed, 11);
        assert!(outcome.state.warm.find("fresh").is_some());
    }

    #[test]
    fn eviction_prefers_lowest_salience_then_oldest() {
        let mut prior = first_turn_state();
        let cap = contract().episodic_cap;
        for i in 0..cap {
            prior.warm.episodic.push(MemoryEntry {
                key: format!("m{i}"),
                note: String::new(),
                salience: if i == 3 { 0.1 } else { 0.8 },
                turn: i as u64,
                tags: vec![],
            });
        }
        let outcome = apply_acts(&[memory_add("fresh", 0.9)], &prior, &contract()).unwrap();
        // m3 had the lowest salience; it goes first.
        assert!(outcome.state.warm.find("m3").is_none());
        assert!(outcome.state.warm.find("m0").is_some());
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let mut prior = first_turn_state();
        let cap = contract().episodic_cap;
        prior.warm = WarmState::default();
        for i in 0..cap {
            prior.warm.episodic.push(MemoryEntry {
                key: format!("m{i}"),
                note: String::new(),
                salience: 0.0,
                turn: i as u64,
                tags: vec![],
            });
        }
        let _ = prior.warm.pinned.insert("m0".into());
        let outcome = apply_acts(&[memory_add("fresh", 0.0)], &prior, &contract()).unwrap();
        // m0 is pinned and the lowest-(salience, turn) otherwise; m1 goes.
        assert!(outcome.state.warm.find("m0").is_some());
        assert!(outcome.state.warm.find("m1").is_none());
    }

    #[test]
    fn note_is_truncated_with_ellipsis() {
        let prior = first_turn_state();
        let long = "x".repeat(500);
        let outcome = apply_acts(
            &[known(Act::MemoryAdd {
                key: "k".into(),
                note: long,
                salience: 0.5,
                tags: vec![],
            })],
            &prior,
            &contract(),
        )
        .unwrap();
        let stored = &outcome.state.warm.find("k").unwrap().note;
        assert_eq!(stored.chars().count(), contract().note_max_chars);
        assert!(stored.ends_with('…'));
    }

    #[test]
    fn tag_and_remove_missing_key_are_violations() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[
                known(Act::MemoryTag {
                    key: "ghost".into(),
                    tags: vec!["spooky".into()],
                }),
                known(Act::MemoryRemove { key: "ghost".into() }),
            ],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.summary.violations.len(), 2);
        assert!(outcome
            .summary
            .violations
            .iter()
            .all(|v| v.code == "missing_key"));
    }

    #[test]
    fn pin_add_is_set_semantics() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[
                known(Act::PinAdd { key: "k".into() }),
                known(Act::PinAdd { key: "k".into() }),
            ],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.state.warm.pinned.len(), 1);
        assert_eq!(outcome.summary.memory_pinned, 1);
    }

    // -- Forward compatibility --

    #[test]
    fn unknown_act_is_violation_not_abort() {
        let prior = first_turn_state();
        let outcome = apply_acts(
            &[ParsedAct::Unknown {
                tag: "party_invite".into(),
                raw: json!({"t": "party_invite"}),
            }],
            &prior,
            &contract(),
        )
        .unwrap();
        assert_eq!(outcome.summary.violations[0].code, "unknown_act");
        assert_eq!(outcome.state.turn, 1);
    }

    #[test]
    fn disallowed_act_is_violation() {
        let prior = first_turn_state();
        let mut narrow = contract();
        narrow.allowed_acts = vec!["scene_set".into()];
        let outcome = apply_acts(
            &[known(Act::FlagSet {
                key: "k".into(),
                value: json!(1),
            })],
            &prior,
            &narrow,
        )
        .unwrap();
        assert_eq!(outcome.summary.violations[0].code, "act_not_allowed");
        assert!(outcome.state.hot.flags.is_empty());
    }

    // -- Idempotence --

    #[test]
    fn apply_is_idempotent_from_identical_priors() {
        let mut prior = subsequent_state();
        let _ = prior.hot.relations.insert("kael".into(), 40);
        let acts = vec![
            time_advance(75),
            known(Act::RelationDelta {
                npc: "kael".into(),
                delta: 12,
            }),
            memory_add("m", 0.4),
            known(Act::ObjectiveUpsert {
                id: "o".into(),
                title: None,
                status: "open".into(),
            }),
        ];
        let a = apply_acts(&acts, &prior, &contract()).unwrap();
        let b = apply_acts(&acts, &prior.clone(), &contract()).unwrap();
        assert_eq!(a.state, b.state);
        assert_eq!(a.summary, b.summary);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn relation_values_never_leave_the_scale(
                deltas in proptest::collection::vec(-300i64..300, 1..8)
            ) {
                let prior = first_turn_state();
                let acts: Vec<ParsedAct> = deltas
                    .iter()
                    .map(|d| known(Act::RelationDelta {
                        npc: "kael".into(),
                        delta: *d,
                    }))
                    .collect();
                let outcome = apply_acts(&acts, &prior, &contract()).unwrap();
                let stored = outcome.state.hot.relations["kael"];
                prop_assert!((0..=100).contains(&stored));
            }

            #[test]
            fn apply_is_pure_under_arbitrary_act_mixes(
                deltas in proptest::collection::vec(-50i64..50, 0..6),
                ticks in 1i64..240,
            ) {
                let prior = subsequent_state();
                let mut acts = vec![time_advance(ticks)];
                acts.extend(deltas.iter().map(|d| known(Act::RelationDelta {
                    npc: "mira".into(),
                    delta: *d,
                })));
                let a = apply_acts(&acts, &prior, &contract()).unwrap();
                let b = apply_acts(&acts, &prior.clone(), &contract()).unwrap();
                prop_assert_eq!(a.state, b.state);
                prop_assert_eq!(a.summary, b.summary);
            }
        }
    }
}
