//! Bundle assembler: one `Bundle` per turn.
//!
//! Orchestrates repositories, the cache, the slice compactor, and the budget
//! enforcer. Resolution of the core contract, world, adventure, scenario,
//! and injection map fans out concurrently and joins; NPC documents load as
//! one batched multi-ID lookup.
//!
//! Caching is product-oriented: the expensive artifacts (projected document
//! views, NPC views, compacted slices) are memoized under keys derived from
//! `(kind, id, version, content hash)`, so editing a document invalidates
//! exactly the entries built from it. Source documents are never mutated.

use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use fable_core::cache::{CacheExt, CacheProvider};
use fable_core::documents::{
    AdventureDoc, AdventureStartDoc, CoreContract, DocRepository, InjectionMapDoc, NpcDoc,
    RepoError, RulesetDoc, SessionDoc, VersionedDoc, WorldDoc, content_hash_bytes,
};
use fable_core::errors::{DocKind, TurnError, TurnResult};
use fable_core::ids::{SessionId, TurnId};
use fable_core::metrics::{Labels, MetricsSink, labels};
use fable_settings::types::EngineSettings;
use fable_state::store::GameStateStore;
use fable_state::types::GameState;
use fable_tokens::budget::Reduction;

use crate::compactor::compact_slice;
use crate::doc_compact::{discipline, project_adventure, project_world};
use crate::enforcer::enforce_input_budget;
use crate::injection::apply_injection_map;
use crate::types::{
    Assembled, AssembleMetrics, Bundle, BundleMeta, BudgetStamp, CompactDoc, NpcSection, NpcView,
    RngPolicy, ScenarioView, SliceView,
};

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies trait
// ─────────────────────────────────────────────────────────────────────────────

/// Injected collaborators for bundle assembly.
///
/// Everything behind this trait is constructed once per process and passed by
/// reference; the assembler owns no ambient state.
pub trait AssemblerDeps: Send + Sync {
    /// Session repository.
    fn sessions(&self) -> &dyn DocRepository<SessionDoc>;
    /// Core contract repository.
    fn contracts(&self) -> &dyn DocRepository<CoreContract>;
    /// Ruleset repository.
    fn rulesets(&self) -> &dyn DocRepository<RulesetDoc>;
    /// World repository.
    fn worlds(&self) -> &dyn DocRepository<WorldDoc>;
    /// Adventure repository.
    fn adventures(&self) -> &dyn DocRepository<AdventureDoc>;
    /// Adventure-start (scenario) repository.
    fn adventure_starts(&self) -> &dyn DocRepository<AdventureStartDoc>;
    /// NPC repository.
    fn npcs(&self) -> &dyn DocRepository<NpcDoc>;
    /// Injection-map repository.
    fn injection_maps(&self) -> &dyn DocRepository<InjectionMapDoc>;
    /// Game-state store.
    fn game_states(&self) -> &dyn GameStateStore;
    /// Cache provider.
    fn cache(&self) -> &dyn CacheProvider;
    /// Metrics sink.
    fn metrics(&self) -> &dyn MetricsSink;
    /// Engine settings.
    fn settings(&self) -> &EngineSettings;
}

fn repo_fail(e: RepoError) -> TurnError {
    TurnError::internal("REPO_ERROR", e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// BundleAssembler
// ─────────────────────────────────────────────────────────────────────────────

/// Builds one budget-enforced [`Bundle`] per turn.
pub struct BundleAssembler<D: AssemblerDeps> {
    deps: D,
}

impl<D: AssemblerDeps> BundleAssembler<D> {
    /// Create an assembler over the given collaborators.
    pub fn new(deps: D) -> Self {
        Self { deps }
    }

    /// Access the injected collaborators (the orchestrator shares them).
    pub fn deps(&self) -> &D {
        &self.deps
    }

    /// Assemble the bundle for one turn.
    ///
    /// Fails with [`TurnError::NotFound`] when the session, game state,
    /// contract, world, or adventure cannot be resolved, and with
    /// [`TurnError::BudgetExceeded`] when the reduction cascade exhausts
    /// over the ceiling.
    #[instrument(skip(self, input), fields(session = %session_id))]
    pub async fn assemble(&self, session_id: &SessionId, input: &str) -> TurnResult<Assembled> {
        let started = Instant::now();
        let settings = self.deps.settings().clone();

        // 1. Session + game state. The state document is the source of truth
        //    for world/adventure/scenario refs and scene; the session may
        //    only override locale and ruleset.
        let session = self
            .deps
            .sessions()
            .get_by_id_version(session_id.as_str(), None)
            .await
            .map_err(repo_fail)?
            .ok_or_else(|| TurnError::not_found(DocKind::Session, session_id.as_str()))?;

        let versioned_state = self
            .deps
            .game_states()
            .load(session_id)
            .await
            .map_err(|e| TurnError::internal("STATE_LOAD", e.to_string()))?
            .ok_or_else(|| TurnError::not_found(DocKind::GameState, session_id.as_str()))?;
        let state = versioned_state.state;
        let locale = session.doc.locale.clone();

        // 2. Fan-out resolution of the remaining documents.
        let scenario_ref = state.scenario.clone();
        let (contract, ruleset, world, adventure, start, injection_map) = tokio::try_join!(
            self.active_contract(),
            self.resolve_ruleset(&session.doc),
            self.resolve_required(DocKind::World, self.deps.worlds(), state.world.as_str()),
            self.resolve_required(
                DocKind::Adventure,
                self.deps.adventures(),
                state.adventure.as_str(),
            ),
            self.resolve_scenario(scenario_ref.as_ref().map(|s| s.as_str())),
            self.active_injection_map(),
        )?;

        // 3–4. Project, overlay, and discipline the world/adventure views,
        //      then attach scene-selected slices.
        let mut doc_reductions: Vec<Reduction> = Vec::new();
        let scene = state.hot.scene.as_str();

        let mut world_view =
            self.doc_view(DocKind::World, &world, locale.as_deref(), project_world, &settings);
        world_view.slices = self.slices_for(
            DocKind::World,
            &world.id,
            &world.doc.lore,
            scene_names(&world.doc.slice_policy, &world.doc.default_slices, scene),
            &settings,
        );
        let world_view = discipline(
            "world",
            world_view,
            settings.budgets.doc_max_tokens,
            &settings.turn.cast_caps,
            &mut doc_reductions,
        );

        let mut adventure_view = self.doc_view(
            DocKind::Adventure,
            &adventure,
            locale.as_deref(),
            project_adventure,
            &settings,
        );
        adventure_view.slices = self.slices_for(
            DocKind::Adventure,
            &adventure.id,
            &adventure.doc.lore,
            scene_names(
                &adventure.doc.slice_policy,
                &adventure.doc.default_slices,
                scene,
            ),
            &settings,
        );
        let adventure_view = discipline(
            "adventure",
            adventure_view,
            settings.budgets.doc_max_tokens,
            &settings.turn.cast_caps,
            &mut doc_reductions,
        );

        // 5. NPC refs: union of game state, scenario, adventure cast, and
        //    ruleset, de-duplicated; batched load; narration-safe views.
        let refs = npc_refs(&state, start.as_ref(), &adventure.doc, &ruleset);
        let npc_views = self.npc_views(&refs).await?;

        // 6. Compose, then execute the injection map.
        let scenario_view = start.as_ref().and_then(|s| {
            scenario_ref.as_ref().map(|id| ScenarioView {
                id: id.clone(),
                scene: s.doc.scene.clone(),
                opening: s.doc.opening.clone(),
            })
        });

        let mut bundle = Bundle {
            meta: BundleMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_owned(),
                world: state.world.clone(),
                adventure: state.adventure.clone(),
                turn_id: TurnId::new(),
                turn_index: state.turn,
                is_first_turn: state.turn == 0,
                locale: locale.clone(),
                budgets: BudgetStamp {
                    max_input_tokens: settings.budgets.max_input_tokens,
                    max_output_tokens: settings.budgets.max_output_tokens,
                },
            },
            contract: contract.doc.clone(),
            ruleset: ruleset.clone(),
            world: world_view,
            adventure: adventure_view,
            scenario: scenario_view,
            npcs: NpcSection { active: npc_views },
            player: session.doc.player.clone(),
            game_state: state.clone(),
            rng: RngPolicy {
                seed: rng_seed(session_id, state.turn),
                policy: "narrative".to_owned(),
            },
            input: input.to_owned(),
            extras: Default::default(),
        };

        bundle = self.inject(bundle, &session.doc, &contract.doc, &ruleset, &world.doc, &adventure.doc, start.as_ref(), &state, &injection_map);

        // 7. Budget enforcement.
        let mut budget = enforce_input_budget(&mut bundle, &settings.budgets);
        let mut reductions = doc_reductions;
        reductions.append(&mut budget.reductions);
        budget.reductions = reductions;
        for reduction in &budget.reductions {
            self.deps.metrics().counter(
                "bundle_reductions_total",
                &labels([("kind", reduction.kind.as_str())]),
                1,
            );
        }
        if !budget.within_budget {
            return Err(TurnError::BudgetExceeded {
                estimated: budget.final_tokens,
                limit: settings.budgets.max_input_tokens,
            });
        }

        // 8. Structural validation + metrics.
        let serialized = serde_json::to_value(&bundle)
            .map_err(|e| TurnError::internal("BUNDLE_SERIALIZE", e.to_string()))?;
        validate_shape(&serialized)?;

        #[allow(clippy::cast_possible_truncation)]
        let metrics = AssembleMetrics {
            byte_size: serialized.to_string().len(),
            estimated_tokens: budget.final_tokens,
            npc_count: bundle.npcs.active.len(),
            slice_count: bundle.slice_count(),
            build_ms: started.elapsed().as_millis() as u64,
        };
        self.deps
            .metrics()
            .timer_ms("bundle_build_ms", &Labels::new(), metrics.build_ms);
        #[allow(clippy::cast_precision_loss)]
        self.deps
            .metrics()
            .gauge("bundle_tokens", &Labels::new(), metrics.estimated_tokens as f64);

        Ok(Assembled {
            bundle,
            budget,
            metrics,
            state_version: versioned_state.version,
        })
    }

    // ── Resolution helpers ──

    /// The active core contract, cache-first.
    async fn active_contract(&self) -> TurnResult<VersionedDoc<CoreContract>> {
        self.active_cached(DocKind::CoreContract, self.deps.contracts())
            .await?
            .ok_or_else(|| TurnError::not_found(DocKind::CoreContract, "active"))
    }

    /// The active injection map; missing is non-fatal and falls back to an
    /// empty map.
    async fn active_injection_map(&self) -> TurnResult<InjectionMapDoc> {
        match self
            .active_cached(DocKind::InjectionMap, self.deps.injection_maps())
            .await?
        {
            Some(doc) => Ok(doc.doc),
            None => {
                warn!("no active injection map, proceeding with defaults");
                Ok(InjectionMapDoc::default())
            }
        }
    }

    /// The effective ruleset: session override, else the active one, else a
    /// default.
    async fn resolve_ruleset(&self, session: &SessionDoc) -> TurnResult<RulesetDoc> {
        if let Some(id) = &session.ruleset {
            return match self
                .deps
                .rulesets()
                .get_by_id_version(id.as_str(), None)
                .await
                .map_err(repo_fail)?
            {
                Some(doc) => Ok(doc.doc),
                None => Err(TurnError::not_found(DocKind::Ruleset, id.as_str())),
            };
        }
        match self
            .active_cached(DocKind::Ruleset, self.deps.rulesets())
            .await?
        {
            Some(doc) => Ok(doc.doc),
            None => {
                debug!("no active ruleset, using defaults");
                Ok(RulesetDoc::default())
            }
        }
    }

    /// Resolve a required document by ID.
    async fn resolve_required<T>(
        &self,
        kind: DocKind,
        repo: &dyn DocRepository<T>,
        id: &str,
    ) -> TurnResult<VersionedDoc<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        repo.get_by_id_version(id, None)
            .await
            .map_err(repo_fail)?
            .ok_or_else(|| TurnError::not_found(kind, id))
    }

    /// Resolve the scenario document, if the state references one.
    async fn resolve_scenario(
        &self,
        id: Option<&str>,
    ) -> TurnResult<Option<VersionedDoc<AdventureStartDoc>>> {
        let Some(id) = id else { return Ok(None) };
        self.resolve_required(DocKind::AdventureStart, self.deps.adventure_starts(), id)
            .await
            .map(Some)
    }

    /// Cache-first resolution of an active-scoped document.
    async fn active_cached<T>(
        &self,
        kind: DocKind,
        repo: &dyn DocRepository<T>,
    ) -> TurnResult<Option<VersionedDoc<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let key = format!("doc:{kind}:active");
        if let Some(doc) = self.deps.cache().get::<VersionedDoc<T>>(&key) {
            return Ok(Some(doc));
        }
        let resolved = repo.get_active(None).await.map_err(repo_fail)?;
        if let Some(doc) = &resolved {
            self.deps
                .cache()
                .set(&key, doc, self.deps.settings().cache.doc_ttl_secs);
        }
        Ok(resolved)
    }

    // ── Compaction helpers ──

    /// Projected (pre-discipline) world/adventure view, memoized by
    /// `(kind, id, version, hash, locale)`.
    fn doc_view<T>(
        &self,
        kind: DocKind,
        doc: &VersionedDoc<T>,
        locale: Option<&str>,
        project: impl Fn(&T, Option<&str>) -> CompactDoc,
        settings: &EngineSettings,
    ) -> CompactDoc {
        let key = format!(
            "view:{kind}:{}:{}:{}:{}",
            doc.id,
            doc.version,
            doc.hash,
            locale.unwrap_or("-")
        );
        if let Some(view) = self.deps.cache().get::<CompactDoc>(&key) {
            return view;
        }
        let view = project(&doc.doc, locale);
        self.deps
            .cache()
            .set(&key, &view, settings.cache.doc_ttl_secs);
        view
    }

    /// Compact the selected slices for one document, each memoized by the
    /// content hash of its own lore text.
    fn slices_for(
        &self,
        kind: DocKind,
        doc_id: &str,
        lore: &std::collections::BTreeMap<String, String>,
        names: Vec<String>,
        settings: &EngineSettings,
    ) -> Vec<SliceView> {
        let max = settings.budgets.slice_max_tokens;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let Some(text) = lore.get(&name) else {
                warn!(%kind, doc = doc_id, slice = %name, "slice policy names absent lore, skipping");
                continue;
            };
            let key = format!(
                "slice:{kind}:{doc_id}:{name}:{}:{max}",
                content_hash_bytes(text.as_bytes())
            );
            if let Some(view) = self.deps.cache().get::<SliceView>(&key) {
                out.push(view);
                continue;
            }
            let view = compact_slice(&name, text, max);
            self.deps
                .cache()
                .set(&key, &view, settings.cache.slice_ttl_secs);
            out.push(view);
        }
        out
    }

    /// Batched NPC load + per-document view compaction.
    async fn npc_views(&self, refs: &[String]) -> TurnResult<Vec<NpcView>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .deps
            .npcs()
            .list_by_ids(refs)
            .await
            .map_err(repo_fail)?;
        let ttl = self.deps.settings().cache.doc_ttl_secs;
        let mut views = Vec::with_capacity(docs.len());
        for doc in docs {
            let key = format!("view:npc:{}:{}:{}", doc.id, doc.version, doc.hash);
            if let Some(view) = self.deps.cache().get::<NpcView>(&key) {
                views.push(view);
                continue;
            }
            let view = NpcView {
                id: doc.id.clone().into(),
                name: doc.doc.name.clone(),
                archetype: doc.doc.archetype.clone(),
                summary: doc.doc.summary.clone(),
                voice: doc.doc.voice.clone(),
                register: doc.doc.register.clone(),
                tags: doc.doc.tags.clone(),
                priority: doc.doc.priority,
            };
            self.deps.cache().set(&key, &view, ttl);
            views.push(view);
        }
        Ok(views)
    }

    // ── Injection ──

    /// Execute the injection map against the serialized bundle. Never fatal;
    /// a directive that breaks the typed round trip is discarded with the
    /// whole injection pass.
    #[allow(clippy::too_many_arguments)]
    fn inject(
        &self,
        bundle: Bundle,
        session: &SessionDoc,
        contract: &CoreContract,
        ruleset: &RulesetDoc,
        world: &WorldDoc,
        adventure: &AdventureDoc,
        start: Option<&VersionedDoc<AdventureStartDoc>>,
        state: &GameState,
        map: &InjectionMapDoc,
    ) -> Bundle {
        if map.directives.is_empty() {
            return bundle;
        }
        let sources = serde_json::json!({
            "session": session,
            "contract": contract,
            "ruleset": ruleset,
            "world": world,
            "adventure": adventure,
            "adventureStart": start.map(|s| &s.doc),
            "gameState": state,
        });
        let Ok(mut value) = serde_json::to_value(&bundle) else {
            return bundle;
        };
        let report = apply_injection_map(&mut value, &sources, map);
        debug!(applied = report.applied, skipped = report.skipped, "injection map executed");
        match serde_json::from_value::<Bundle>(value) {
            Ok(injected) => injected,
            Err(e) => {
                warn!(error = %e, "injected bundle failed re-typing, keeping pre-injection bundle");
                bundle
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Slice names for a scene: the explicit per-scene list when the policy has
/// one, else the document-wide default list.
fn scene_names(
    policy: &std::collections::BTreeMap<String, Vec<String>>,
    defaults: &[String],
    scene: &str,
) -> Vec<String> {
    policy
        .get(scene)
        .cloned()
        .unwrap_or_else(|| defaults.to_vec())
}

/// Union of NPC refs from game state relations, scenario, adventure cast,
/// and ruleset, first occurrence wins.
fn npc_refs(
    state: &GameState,
    start: Option<&VersionedDoc<AdventureStartDoc>>,
    adventure: &AdventureDoc,
    ruleset: &RulesetDoc,
) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |id: &str| {
        if seen.insert(id.to_owned()) {
            out.push(id.to_owned());
        }
    };

    for key in state.hot.relations.keys() {
        push(key);
    }
    if let Some(start) = start {
        for id in &start.doc.npc_refs {
            push(id.as_str());
        }
    }
    for id in &adventure.cast {
        push(id.as_str());
    }
    for id in &ruleset.npc_refs {
        push(id.as_str());
    }
    out
}

/// Deterministic per-turn RNG seed from `(session, turn index)`.
#[must_use]
pub fn rng_seed(session: &SessionId, turn: u64) -> u64 {
    let hash = content_hash_bytes(format!("{session}:{turn}").as_bytes());
    u64::from_str_radix(&hash[..16], 16).unwrap_or(0)
}

/// Required-keys/shape check over the serialized bundle.
fn validate_shape(value: &Value) -> TurnResult<()> {
    let required = [
        "meta",
        "contract",
        "ruleset",
        "npcs",
        "player",
        "gameState",
        "rng",
        "input",
    ];
    for key in required {
        if value.get(key).is_none() {
            return Err(TurnError::internal(
                "BUNDLE_SHAPE",
                format!("assembled bundle is missing '{key}'"),
            ));
        }
    }
    if !value["npcs"]["active"].is_array() {
        return Err(TurnError::internal(
            "BUNDLE_SHAPE",
            "npcs.active is not an array",
        ));
    }
    Ok(())
}
