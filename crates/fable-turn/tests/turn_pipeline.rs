//! End-to-end pipeline tests: in-memory repositories, a scripted model
//! provider, and the full orchestrator.

use std::collections::VecDeque;

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use fable_bundle::assembler::AssemblerDeps;
use fable_core::cache::{CacheProvider, MemoryCache};
use fable_core::documents::{
    AdventureDoc, AdventureStartDoc, CoreContract, DocRepository, InjectionDirective,
    InjectionMapDoc, NpcDoc, PlayerProfile, RulesetDoc, SessionDoc, WorldDoc,
};
use fable_core::errors::TurnError;
use fable_core::ids::SessionId;
use fable_core::memory::MemoryRepository;
use fable_core::metrics::{Labels, MemoryMetrics, MetricsSink, labels};
use fable_settings::types::EngineSettings;
use fable_state::store::{GameStateStore, MemoryGameStateStore};
use fable_state::types::GameState;
use fable_llm::provider::{
    InferRequest, ModelProvider, ModelReply, ProviderError, ToolCall, ToolDef,
};
use fable_turn::orchestrator::{OrchestratorDeps, TurnOrchestrator};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted provider
// ─────────────────────────────────────────────────────────────────────────────

/// Replays a scripted sequence of replies; records the systems it saw.
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    systems_seen: Mutex<Vec<String>>,
    tool_results_seen: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
    fn push_json(&self, value: Value) {
        self.script.lock().push_back(Ok(ModelReply {
            raw: value.to_string(),
            json: Some(value),
            tool_calls: vec![],
        }));
    }

    fn push_reply(&self, reply: Result<ModelReply, ProviderError>) {
        self.script.lock().push_back(reply);
    }

    fn next(&self, request: &InferRequest<'_>) -> Result<ModelReply, ProviderError> {
        self.systems_seen.lock().push(request.system.to_owned());
        self.tool_results_seen.lock().push(
            serde_json::to_value(request.tool_results).unwrap_or(Value::Null),
        );
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::permanent("script exhausted")))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn infer(&self, request: InferRequest<'_>) -> Result<ModelReply, ProviderError> {
        self.next(&request)
    }

    async fn infer_with_tools(
        &self,
        request: InferRequest<'_>,
        _tools: &[ToolDef],
    ) -> Result<ModelReply, ProviderError> {
        self.next(&request)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test harness
// ─────────────────────────────────────────────────────────────────────────────

struct TestDeps {
    sessions: MemoryRepository<SessionDoc>,
    contracts: MemoryRepository<CoreContract>,
    rulesets: MemoryRepository<RulesetDoc>,
    worlds: MemoryRepository<WorldDoc>,
    adventures: MemoryRepository<AdventureDoc>,
    starts: MemoryRepository<AdventureStartDoc>,
    npcs: MemoryRepository<NpcDoc>,
    injection_maps: MemoryRepository<InjectionMapDoc>,
    states: MemoryGameStateStore,
    cache: MemoryCache,
    metrics: MemoryMetrics,
    settings: EngineSettings,
    provider: ScriptedProvider,
}

impl AssemblerDeps for TestDeps {
    fn sessions(&self) -> &dyn DocRepository<SessionDoc> {
        &self.sessions
    }
    fn contracts(&self) -> &dyn DocRepository<CoreContract> {
        &self.contracts
    }
    fn rulesets(&self) -> &dyn DocRepository<RulesetDoc> {
        &self.rulesets
    }
    fn worlds(&self) -> &dyn DocRepository<WorldDoc> {
        &self.worlds
    }
    fn adventures(&self) -> &dyn DocRepository<AdventureDoc> {
        &self.adventures
    }
    fn adventure_starts(&self) -> &dyn DocRepository<AdventureStartDoc> {
        &self.starts
    }
    fn npcs(&self) -> &dyn DocRepository<NpcDoc> {
        &self.npcs
    }
    fn injection_maps(&self) -> &dyn DocRepository<InjectionMapDoc> {
        &self.injection_maps
    }
    fn game_states(&self) -> &dyn GameStateStore {
        &self.states
    }
    fn cache(&self) -> &dyn CacheProvider {
        &self.cache
    }
    fn metrics(&self) -> &dyn MetricsSink {
        &self.metrics
    }
    fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl OrchestratorDeps for TestDeps {
    fn provider(&self) -> &dyn ModelProvider {
        &self.provider
    }
}

fn session_id() -> SessionId {
    SessionId::from("s-1")
}

/// Seed a minimal but complete document set and an initial turn-0 state.
async fn seed() -> TestDeps {
    let deps = TestDeps {
        sessions: MemoryRepository::new(),
        contracts: MemoryRepository::new(),
        rulesets: MemoryRepository::new(),
        worlds: MemoryRepository::new(),
        adventures: MemoryRepository::new(),
        starts: MemoryRepository::new(),
        npcs: MemoryRepository::new(),
        injection_maps: MemoryRepository::new(),
        states: MemoryGameStateStore::new(),
        cache: MemoryCache::new(),
        metrics: MemoryMetrics::new(),
        settings: EngineSettings::default(),
        provider: ScriptedProvider::default(),
    };

    let _ = deps.sessions.insert(
        "s-1",
        SessionDoc {
            player: PlayerProfile {
                name: "Rel".into(),
                ..PlayerProfile::default()
            },
            ..SessionDoc::default()
        },
    );

    let _ = deps.contracts.insert("contract-1", CoreContract::default());
    deps.contracts.set_active(None, "contract-1");

    let _ = deps.worlds.insert(
        "w-1",
        WorldDoc {
            name: "Vhelm".into(),
            tone: Some("grim".into()),
            lore: [("docks".to_owned(), "Salt air.\n- Guild law rules the piers".to_owned())]
                .into(),
            default_slices: vec!["docks".into()],
            ..WorldDoc::default()
        },
    );
    let _ = deps.adventures.insert(
        "a-1",
        AdventureDoc {
            name: "The Ledger".into(),
            ..AdventureDoc::default()
        },
    );

    let initial = GameState {
        world: "w-1".into(),
        adventure: "a-1".into(),
        ..GameState::default()
    };
    let version = deps.states.commit(&session_id(), initial, 0).await.unwrap();
    assert_eq!(version, 1);

    deps
}

fn valid_first_turn_reply() -> Value {
    json!({
        "txt": "Fog hangs over the piers.",
        "acts": [
            {"t": "scene_set", "scene": "docks"},
            {"t": "memory_add", "key": "arrival", "note": "Arrived at the docks.", "salience": 0.6}
        ],
        "choices": [{"id": "c1", "label": "Find the harbormaster"}],
        "scn": "docks",
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_turn_round_trip() {
    let deps = seed().await;
    deps.provider.push_json(valid_first_turn_reply());
    let orchestrator = TurnOrchestrator::new(deps);

    let outcome = orchestrator
        .run_turn(&session_id(), "step off the boat")
        .await
        .unwrap();

    assert_eq!(outcome.response.txt, "Fog hangs over the piers.");
    assert_eq!(outcome.response.meta.scn, "docks");
    assert_eq!(outcome.response.choices.len(), 1);
    assert_eq!(outcome.state_version, 2);
    assert!(!outcome.telemetry.retried);
    assert!(outcome.budget.within_budget);
    // No NPCs and no scenario is a valid first turn.
    assert_eq!(outcome.telemetry.assemble.npc_count, 0);
    assert_eq!(outcome.summary.violations.len(), 0);

    // The new state is persisted with the scene and memory applied.
    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.state.turn, 1);
    assert_eq!(stored.state.hot.scene.as_str(), "docks");
    assert!(stored.state.warm.find("arrival").is_some());
    assert_eq!(
        deps.metrics
            .counter_value("turns_total", &labels([("outcome", "ok")])),
        1
    );
}

#[tokio::test]
async fn subsequent_turn_without_time_advance_fails_and_preserves_state() {
    let deps = seed().await;
    // Move the stored state to turn 1 first.
    deps.provider.push_json(valid_first_turn_reply());
    // Second turn: no time_advance act.
    deps.provider.push_json(json!({
        "txt": "Nothing moves.",
        "acts": [{"t": "flag_set", "key": "waited", "value": true}],
    }));
    let orchestrator = TurnOrchestrator::new(deps);

    let _ = orchestrator.run_turn(&session_id(), "arrive").await.unwrap();
    let err = orchestrator
        .run_turn(&session_id(), "wait")
        .await
        .unwrap_err();
    assert_matches!(err, TurnError::ContractViolation { .. });

    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.state.turn, 1);
    assert!(stored.state.hot.flags.is_empty());
}

#[tokio::test]
async fn subsequent_turn_with_one_time_advance_commits() {
    let deps = seed().await;
    deps.provider.push_json(valid_first_turn_reply());
    deps.provider.push_json(json!({
        "txt": "The morning bell rings.",
        "acts": [{"t": "time_advance", "ticks": 70}],
    }));
    let orchestrator = TurnOrchestrator::new(deps);

    let _ = orchestrator.run_turn(&session_id(), "arrive").await.unwrap();
    let outcome = orchestrator.run_turn(&session_id(), "wait").await.unwrap();

    assert!(outcome.summary.time_transition.is_some());
    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.state.turn, 2);
    // 70 ticks from (Dawn, 0) with 60-tick bands lands at (Morning, 10).
    assert_eq!(stored.state.hot.time.ticks, 10);
}

#[tokio::test]
async fn invalid_reply_gets_exactly_one_repair_retry() {
    let deps = seed().await;
    deps.provider.push_json(json!({"acts": []})); // missing txt
    deps.provider.push_json(valid_first_turn_reply());
    let orchestrator = TurnOrchestrator::new(deps);

    let outcome = orchestrator.run_turn(&session_id(), "arrive").await.unwrap();
    assert!(outcome.telemetry.retried);

    let deps = orchestrator_deps(&orchestrator);
    assert_eq!(
        deps.metrics
            .counter_value("validation_retries_total", &Labels::new()),
        1
    );
    // The retry used the repair prompt variant.
    let systems = deps.provider.systems_seen.lock();
    assert!(systems.last().unwrap().starts_with("Your previous reply was invalid"));
}

#[tokio::test]
async fn second_invalid_reply_fails_hard_and_persists_nothing() {
    let deps = seed().await;
    deps.provider.push_json(json!({"acts": []}));
    deps.provider.push_json(json!({"txt": ""}));
    let orchestrator = TurnOrchestrator::new(deps);

    let err = orchestrator
        .run_turn(&session_id(), "arrive")
        .await
        .unwrap_err();
    assert_matches!(err, TurnError::ValidationFailed { .. });

    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.state.turn, 0);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn commit_failure_fails_the_turn_and_keeps_prior_state() {
    let deps = seed().await;
    deps.provider.push_json(valid_first_turn_reply());
    deps.states.fail_next_commit();
    let orchestrator = TurnOrchestrator::new(deps);

    let err = orchestrator
        .run_turn(&session_id(), "arrive")
        .await
        .unwrap_err();
    assert_matches!(err, TurnError::Apply { .. });

    // The pre-turn snapshot is still the persisted truth.
    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.state.turn, 0);
    assert!(stored.state.warm.find("arrival").is_none());
}

#[tokio::test]
async fn tool_calls_beyond_quota_get_denied_stubs() {
    let deps = seed().await;
    // First round trip: three tool calls against a quota of two.
    deps.provider.push_reply(Ok(ModelReply {
        raw: String::new(),
        json: None,
        tool_calls: (0..3)
            .map(|i| ToolCall {
                name: "fetch_slice".into(),
                arguments: json!({"sliceName": if i == 0 { "docks" } else { "ghost" }}),
            })
            .collect(),
    }));
    // Second round trip incorporates the results and answers properly.
    deps.provider.push_json(valid_first_turn_reply());
    let orchestrator = TurnOrchestrator::new(deps);

    let outcome = orchestrator.run_turn(&session_id(), "arrive").await.unwrap();
    assert_eq!(outcome.telemetry.tool_calls.executed, 2);
    assert_eq!(outcome.telemetry.tool_calls.denied, 1);

    let deps = orchestrator_deps(&orchestrator);
    let seen = deps.provider.tool_results_seen.lock();
    // Second request carried all three results, the last one a denied stub.
    let results = seen.last().unwrap().as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["result"]["found"], json!(true));
    assert_eq!(results[2]["result"]["denied"], json!(true));
}

#[tokio::test]
async fn provider_failure_is_fatal_without_repair_retry() {
    let deps = seed().await;
    deps.provider
        .push_reply(Err(ProviderError::transient("overloaded")));
    let orchestrator = TurnOrchestrator::new(deps);

    let err = orchestrator
        .run_turn(&session_id(), "arrive")
        .await
        .unwrap_err();
    assert_matches!(err, TurnError::Model { retryable: true, .. });

    // No further provider calls were made.
    let deps = orchestrator_deps(&orchestrator);
    assert_eq!(deps.provider.systems_seen.lock().len(), 1);
}

#[tokio::test]
async fn dry_run_validates_without_mutating_state() {
    let deps = seed().await;
    deps.provider.push_json(valid_first_turn_reply());
    let orchestrator = TurnOrchestrator::new(deps);

    let outcome = orchestrator.dry_run(&session_id(), "arrive").await.unwrap();
    assert_eq!(outcome.reply.txt, "Fog hangs over the piers.");

    let deps = orchestrator_deps(&orchestrator);
    let stored = deps.states.load(&session_id()).await.unwrap().unwrap();
    assert_eq!(stored.state.turn, 0);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let deps = seed().await;
    let orchestrator = TurnOrchestrator::new(deps);
    let err = orchestrator
        .run_turn(&SessionId::from("s-ghost"), "hi")
        .await
        .unwrap_err();
    assert_matches!(err, TurnError::NotFound { .. });
}

#[tokio::test]
async fn injection_map_directives_land_in_the_bundle() {
    let deps = seed().await;
    let _ = deps.injection_maps.insert(
        "map-1",
        InjectionMapDoc {
            directives: vec![InjectionDirective {
                source: "world.tone".into(),
                target: "/ruleset/narration".into(),
            }],
        },
    );
    deps.injection_maps.set_active(None, "map-1");
    deps.provider.push_json(valid_first_turn_reply());
    let orchestrator = TurnOrchestrator::new(deps);

    let outcome = orchestrator.dry_run(&session_id(), "arrive").await.unwrap();
    // The ruleset narration now carries the world tone.
    assert_eq!(outcome.bundle.ruleset.narration.as_deref(), Some("grim"));
}

fn orchestrator_deps<D: OrchestratorDeps>(orchestrator: &TurnOrchestrator<D>) -> &D {
    orchestrator.deps()
}
