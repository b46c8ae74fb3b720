//! Token budget enforcer: the staged reduction cascade.
//!
//! Each stage runs only while the previous one left the bundle over budget,
//! and every stage's savings are **measured** by re-estimating the serialized
//! bundle, never assumed. Estimation is monotone in serialized size, so the
//! cascade either converges under the ceiling or exhausts its fixed stage
//! list; it cannot loop.

use tracing::{debug, warn};

use fable_settings::types::BudgetSettings;
use fable_tokens::budget::{
    BudgetResult, ModelConfig, OutputBudgetCheck, Reduction, ReductionKind,
};
use fable_tokens::estimator::{estimate_json_tokens, estimate_text_tokens};

use crate::types::Bundle;

/// Run the input-budget cascade over an assembled bundle, mutating it in
/// place. Stage order: NPC trim toward the floor, then slice trim, then
/// exhaustion.
pub fn enforce_input_budget(bundle: &mut Bundle, settings: &BudgetSettings) -> BudgetResult {
    let limit = settings.max_input_tokens;
    let mut reductions = Vec::new();
    let mut estimate = estimate_json_tokens(bundle);

    if estimate > limit {
        estimate = trim_npcs(bundle, settings.npc_floor, limit, estimate, &mut reductions);
    }
    if estimate > limit {
        estimate = trim_slices(bundle, limit, estimate, &mut reductions);
    }

    let within_budget = estimate <= limit;
    if !within_budget {
        warn!(
            estimated = estimate,
            limit, "bundle still over budget after full reduction cascade"
        );
    }

    BudgetResult {
        within_budget,
        reductions,
        final_tokens: estimate,
    }
}

/// Drop lowest-priority NPCs one at a time, never below the floor.
fn trim_npcs(
    bundle: &mut Bundle,
    floor: usize,
    limit: u64,
    mut estimate: u64,
    reductions: &mut Vec<Reduction>,
) -> u64 {
    let before = estimate;
    let mut dropped = 0usize;

    while estimate > limit && bundle.npcs.active.len() > floor {
        let victim = bundle
            .npcs
            .active
            .iter()
            .enumerate()
            .min_by_key(|(_, npc)| npc.priority)
            .map(|(i, _)| i);
        let Some(index) = victim else { break };
        let npc = bundle.npcs.active.remove(index);
        debug!(npc = %npc.id, priority = npc.priority, "budget: dropped NPC");
        dropped += 1;
        estimate = estimate_json_tokens(bundle);
    }

    if dropped > 0 {
        reductions.push(Reduction {
            kind: ReductionKind::NpcTrim,
            description: format!("dropped {dropped} NPC(s) (floor {floor})"),
            tokens_saved: before.saturating_sub(estimate),
        });
    }
    estimate
}

/// Drop lore slices one at a time, longest summary first, adventure before
/// world.
fn trim_slices(
    bundle: &mut Bundle,
    limit: u64,
    mut estimate: u64,
    reductions: &mut Vec<Reduction>,
) -> u64 {
    let before = estimate;
    let mut dropped = 0usize;

    while estimate > limit {
        let doc = match (&mut bundle.adventure, &mut bundle.world) {
            (Some(adventure), _) if !adventure.slices.is_empty() => adventure,
            (_, Some(world)) if !world.slices.is_empty() => world,
            _ => break,
        };
        let victim = doc
            .slices
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| estimate_text_tokens(&s.summary))
            .map(|(i, _)| i);
        let Some(index) = victim else { break };
        let slice = doc.slices.remove(index);
        debug!(slice = %slice.name, "budget: dropped lore slice");
        dropped += 1;
        estimate = estimate_json_tokens(bundle);
    }

    if dropped > 0 {
        reductions.push(Reduction {
            kind: ReductionKind::SliceTrim,
            description: format!("dropped {dropped} lore slice(s)"),
            tokens_saved: before.saturating_sub(estimate),
        });
    }
    estimate
}

/// Pure output-side measurement. The model is responsible for compliance;
/// this only reports.
#[must_use]
pub fn enforce_output_budget(output: &str, settings: &BudgetSettings) -> OutputBudgetCheck {
    let estimated_tokens = estimate_text_tokens(output);
    OutputBudgetCheck {
        within_budget: estimated_tokens <= settings.max_output_tokens,
        estimated_tokens,
        max_tokens: settings.max_output_tokens,
    }
}

/// The output ceiling and sampling temperature the model provider must honor.
#[must_use]
pub fn model_config(settings: &BudgetSettings) -> ModelConfig {
    ModelConfig {
        max_output_tokens: settings.max_output_tokens,
        temperature: settings.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BudgetStamp, Bundle, BundleMeta, CompactDoc, NpcSection, NpcView, RngPolicy, SliceView,
    };
    use fable_core::documents::{CoreContract, PlayerProfile, RulesetDoc};
    use fable_state::GameState;

    fn npc(i: usize, priority: i32) -> NpcView {
        NpcView {
            id: format!("npc-{i}").into(),
            name: format!("NPC {i}"),
            summary: Some("background ".repeat(30)),
            priority,
            ..NpcView::default()
        }
    }

    fn slice(name: &str, len: usize) -> SliceView {
        SliceView {
            name: name.into(),
            summary: "lore ".repeat(len),
            key_points: vec![],
        }
    }

    fn bundle() -> Bundle {
        Bundle {
            meta: BundleMeta {
                engine_version: "0.1.0".into(),
                world: "w-1".into(),
                adventure: "a-1".into(),
                turn_id: "t-1".into(),
                turn_index: 1,
                is_first_turn: false,
                locale: None,
                budgets: BudgetStamp {
                    max_input_tokens: 8_000,
                    max_output_tokens: 1_200,
                },
            },
            contract: CoreContract::default(),
            ruleset: RulesetDoc::default(),
            world: Some(CompactDoc {
                name: "Vhelm".into(),
                slices: vec![slice("docks", 100), slice("guilds", 50)],
                ..CompactDoc::default()
            }),
            adventure: Some(CompactDoc {
                name: "The Ledger".into(),
                slices: vec![slice("opening", 80)],
                ..CompactDoc::default()
            }),
            scenario: None,
            npcs: NpcSection {
                active: (0..10).map(|i| npc(i, i as i32)).collect(),
            },
            player: PlayerProfile::default(),
            game_state: GameState {
                world: "w-1".into(),
                adventure: "a-1".into(),
                turn: 1,
                ..GameState::default()
            },
            rng: RngPolicy {
                seed: 1,
                policy: "narrative".into(),
            },
            input: "ask about the ledger".into(),
            extras: Default::default(),
        }
    }

    fn settings(limit: u64) -> BudgetSettings {
        BudgetSettings {
            max_input_tokens: limit,
            ..BudgetSettings::default()
        }
    }

    #[test]
    fn under_budget_applies_nothing() {
        let mut b = bundle();
        let result = enforce_input_budget(&mut b, &settings(100_000));
        assert!(result.within_budget);
        assert!(result.reductions.is_empty());
        assert_eq!(b.npcs.active.len(), 10);
    }

    #[test]
    fn npc_trim_drops_lowest_priority_first() {
        let mut b = bundle();
        let base = estimate_json_tokens(&b);
        // Tight enough to need a few NPC drops, generous enough to converge
        // before the floor.
        let result = enforce_input_budget(&mut b, &settings(base - 200));
        assert!(result.within_budget);
        assert_eq!(result.reductions[0].kind, ReductionKind::NpcTrim);
        assert!(b.npcs.active.len() >= 5);
        // Priorities 0, 1, ... go first; the high-priority tail survives.
        assert!(b.npcs.active.iter().all(|n| n.priority >= 1));
        assert!(result.reductions[0].tokens_saved > 0);
    }

    #[test]
    fn npc_trim_never_breaches_floor() {
        let mut b = bundle();
        let result = enforce_input_budget(&mut b, &settings(1));
        assert_eq!(b.npcs.active.len(), 5);
        assert!(!result.within_budget);
    }

    #[test]
    fn slice_trim_runs_after_npc_floor() {
        let mut b = bundle();
        let result = enforce_input_budget(&mut b, &settings(1));
        // Exhaustion: everything droppable is gone, still over budget.
        assert_eq!(b.slice_count(), 0);
        assert!(!result.within_budget);
        let kinds: Vec<_> = result.reductions.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ReductionKind::NpcTrim, ReductionKind::SliceTrim]);
    }

    #[test]
    fn cascade_converges_or_exhausts() {
        // Sweep ceilings; the cascade must terminate with a coherent result
        // at every one.
        for limit in [1u64, 100, 500, 1_000, 5_000, 100_000] {
            let mut b = bundle();
            let result = enforce_input_budget(&mut b, &settings(limit));
            assert_eq!(result.within_budget, result.final_tokens <= limit);
            assert!(result.reductions.len() <= 2);
        }
    }

    #[test]
    fn final_tokens_matches_re_estimate() {
        let mut b = bundle();
        let result = enforce_input_budget(&mut b, &settings(500));
        assert_eq!(result.final_tokens, estimate_json_tokens(&b));
    }

    #[test]
    fn output_check_is_pure_measurement() {
        let s = settings(8_000);
        let ok = enforce_output_budget("short reply", &s);
        assert!(ok.within_budget);
        assert_eq!(ok.max_tokens, 1_200);

        let long = "word ".repeat(2_000);
        let over = enforce_output_budget(&long, &s);
        assert!(!over.within_budget);
        assert!(over.estimated_tokens > over.max_tokens);
    }

    #[test]
    fn model_config_reflects_settings() {
        let config = model_config(&BudgetSettings::default());
        assert_eq!(config.max_output_tokens, 1_200);
        assert!((config.temperature - 0.8).abs() < f64::EPSILON);
    }
}
