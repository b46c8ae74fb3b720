//! The turn orchestrator: five ordered phases per turn.
//!
//! 1. **Assemble** — build the budget-enforced bundle.
//! 2. **Infer** — model call with the lore tool offered under a per-turn
//!    quota; at most one extra round trip to incorporate tool results.
//! 3. **Validate** — extract the structured reply; on schema failure run
//!    exactly one repair retry with a fresh system prompt variant.
//! 4. **Apply** — act application and optimistic-version commit.
//! 5. **Respond** — map the reply to the caller-facing shape.
//!
//! Any fatal failure aborts with no partial narrative and no partial state
//! change. Turn metrics are emitted on every path, success or failure.

use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use fable_bundle::assembler::{AssemblerDeps, BundleAssembler};
use fable_bundle::enforcer::{enforce_output_budget, model_config};
use fable_bundle::types::{Assembled, Bundle};
use fable_core::errors::{TurnError, TurnResult};
use fable_core::ids::SessionId;
use fable_core::metrics::{Labels, labels};
use fable_llm::prompts::{base_system_prompt, repair_system_prompt};
use fable_llm::provider::{InferRequest, ModelProvider, ProviderError, ToolCall, ToolDef, ToolResult};
use fable_llm::reply::Awf;
use fable_llm::validator::validate_reply;
use fable_state::acts::ParsedAct;
use fable_state::interpreter::apply_acts;

use crate::types::{
    DryRunOutcome, ToolCallCounts, TurnMeta, TurnOutcome, TurnResponse, TurnTelemetry,
    ValidationAttempt,
};

/// Name of the lore-fetch tool offered each turn.
pub const LORE_TOOL: &str = "fetch_slice";

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborators the orchestrator needs beyond assembly.
pub trait OrchestratorDeps: AssemblerDeps {
    /// The model backend.
    fn provider(&self) -> &dyn ModelProvider;
}

fn provider_fail(e: ProviderError) -> TurnError {
    TurnError::Model {
        message: e.message,
        retryable: e.retryable,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs whole turns.
pub struct TurnOrchestrator<D: OrchestratorDeps> {
    assembler: BundleAssembler<D>,
}

struct Inferred {
    awf: Awf,
    model_ms: u64,
    retried: bool,
    tool_calls: ToolCallCounts,
}

impl<D: OrchestratorDeps> TurnOrchestrator<D> {
    /// Create an orchestrator over the given collaborators.
    pub fn new(deps: D) -> Self {
        Self {
            assembler: BundleAssembler::new(deps),
        }
    }

    /// Access the injected collaborators.
    pub fn deps(&self) -> &D {
        self.assembler.deps()
    }

    /// Run one full turn.
    #[instrument(skip(self, input), fields(session = %session_id))]
    pub async fn run_turn(&self, session_id: &SessionId, input: &str) -> TurnResult<TurnOutcome> {
        let started = Instant::now();
        let result = self.execute(session_id, input).await;

        let outcome = match &result {
            Ok(_) => "ok".to_owned(),
            Err(e) => e.code().to_ascii_lowercase(),
        };
        self.deps()
            .metrics()
            .counter("turns_total", &labels([("outcome", &outcome)]), 1);
        #[allow(clippy::cast_possible_truncation)]
        self.deps().metrics().timer_ms(
            "turn_ms",
            &labels([("outcome", &outcome)]),
            started.elapsed().as_millis() as u64,
        );
        if let Err(e) = &result {
            let phase = e.phase().to_string();
            self.deps()
                .metrics()
                .counter("turn_failures_total", &labels([("phase", &phase)]), 1);
        }
        result
    }

    /// Phases 1–3 only. No state mutation, nothing persisted.
    #[instrument(skip(self, input), fields(session = %session_id))]
    pub async fn dry_run(&self, session_id: &SessionId, input: &str) -> TurnResult<DryRunOutcome> {
        let assembled = self.assemble_counted(session_id, input).await?;
        let inferred = self.infer_and_validate(&assembled).await?;
        self.deps()
            .metrics()
            .counter("dry_runs_total", &Labels::new(), 1);
        Ok(DryRunOutcome {
            bundle: assembled.bundle,
            reply: inferred.awf,
            budget: assembled.budget,
            telemetry: TurnTelemetry {
                assemble: assembled.metrics,
                model_ms: inferred.model_ms,
                retried: inferred.retried,
                tool_calls: inferred.tool_calls,
            },
        })
    }

    async fn execute(&self, session_id: &SessionId, input: &str) -> TurnResult<TurnOutcome> {
        // Phase 1: assemble.
        let assembled = self.assemble_counted(session_id, input).await?;

        // Phases 2–3: infer + validate.
        let inferred = self.infer_and_validate(&assembled).await?;

        // Phase 4: apply + commit.
        let bundle = &assembled.bundle;
        let acts = ParsedAct::parse_all(&inferred.awf.acts);
        let applied = apply_acts(&acts, &bundle.game_state, &bundle.contract)?;
        let state_version = self
            .deps()
            .game_states()
            .commit(
                session_id,
                applied.state.clone(),
                assembled.state_version,
            )
            .await
            .map_err(|e| TurnError::Apply {
                message: e.to_string(),
            })?;

        self.deps().metrics().counter(
            "acts_applied_total",
            &Labels::new(),
            acts.len() as u64,
        );
        self.deps().metrics().counter(
            "act_violations_total",
            &Labels::new(),
            applied.summary.violations.len() as u64,
        );

        // Phase 5: respond.
        let scn = inferred
            .awf
            .scn
            .clone()
            .unwrap_or_else(|| applied.state.hot.scene.to_string());
        Ok(TurnOutcome {
            response: TurnResponse {
                txt: inferred.awf.txt,
                choices: inferred.awf.choices,
                meta: TurnMeta { scn },
            },
            summary: applied.summary,
            state_version,
            budget: assembled.budget,
            telemetry: TurnTelemetry {
                assemble: assembled.metrics,
                model_ms: inferred.model_ms,
                retried: inferred.retried,
                tool_calls: inferred.tool_calls,
            },
        })
    }

    /// Assembly with the fallback metric recorded on failure.
    async fn assemble_counted(
        &self,
        session_id: &SessionId,
        input: &str,
    ) -> TurnResult<Assembled> {
        match self.assembler.assemble(session_id, input).await {
            Ok(assembled) => Ok(assembled),
            Err(e) => {
                self.deps()
                    .metrics()
                    .counter("turn_fallback_total", &labels([("phase", "assemble")]), 1);
                Err(e)
            }
        }
    }

    /// Phases 2–3: the model round trips and the validation state machine.
    async fn infer_and_validate(&self, assembled: &Assembled) -> TurnResult<Inferred> {
        let bundle = &assembled.bundle;
        let settings = self.deps().settings();
        let config = model_config(&settings.budgets);
        let tools = [lore_tool()];
        let quota = settings.turn.tool_call_quota;

        let mut model_ms = 0u64;
        let mut tool_counts = ToolCallCounts::default();
        let mut system = base_system_prompt(&bundle.contract);

        // First round trip, tools offered.
        let mut reply = {
            let t0 = Instant::now();
            let reply = self
                .deps()
                .provider()
                .infer_with_tools(
                    InferRequest {
                        system: &system,
                        bundle,
                        config,
                        tool_results: &[],
                    },
                    &tools,
                )
                .await
                .map_err(provider_fail)?;
            #[allow(clippy::cast_possible_truncation)]
            {
                model_ms += t0.elapsed().as_millis() as u64;
            }
            reply
        };

        // Optional second round trip to incorporate tool results.
        if !reply.tool_calls.is_empty() {
            let results = self.run_tools(bundle, &reply.tool_calls, quota, &mut tool_counts);
            let t0 = Instant::now();
            reply = self
                .deps()
                .provider()
                .infer_with_tools(
                    InferRequest {
                        system: &system,
                        bundle,
                        config,
                        tool_results: &results,
                    },
                    &tools,
                )
                .await
                .map_err(provider_fail)?;
            #[allow(clippy::cast_possible_truncation)]
            {
                model_ms += t0.elapsed().as_millis() as u64;
            }
        }

        // Validation: Initial → RepairRetry → {Accepted, Failed}.
        let mut attempt = ValidationAttempt::Initial;
        loop {
            match validate_reply(reply.json.as_ref(), &bundle.contract) {
                Ok(awf) => {
                    let output = enforce_output_budget(&reply.raw, &settings.budgets);
                    if !output.within_budget {
                        warn!(
                            estimated = output.estimated_tokens,
                            max = output.max_tokens,
                            "model output over its ceiling"
                        );
                        self.deps().metrics().counter(
                            "output_over_budget_total",
                            &Labels::new(),
                            1,
                        );
                    }
                    return Ok(Inferred {
                        awf,
                        model_ms,
                        retried: attempt == ValidationAttempt::RepairRetry,
                        tool_calls: tool_counts,
                    });
                }
                Err(errors) => match attempt {
                    ValidationAttempt::Initial => {
                        debug!(?errors, "reply invalid, running the single repair retry");
                        self.deps().metrics().counter(
                            "validation_retries_total",
                            &Labels::new(),
                            1,
                        );
                        attempt = ValidationAttempt::RepairRetry;
                        system = repair_system_prompt(&bundle.contract, &errors);
                        let t0 = Instant::now();
                        reply = self
                            .deps()
                            .provider()
                            .infer(InferRequest {
                                system: &system,
                                bundle,
                                config,
                                tool_results: &[],
                            })
                            .await
                            .map_err(provider_fail)?;
                        #[allow(clippy::cast_possible_truncation)]
                        {
                            model_ms += t0.elapsed().as_millis() as u64;
                        }
                    }
                    ValidationAttempt::RepairRetry => {
                        return Err(TurnError::ValidationFailed { errors });
                    }
                },
            }
        }
    }

    /// Execute tool calls in order under the quota; calls beyond it get a
    /// denied stub instead of erroring the turn.
    fn run_tools(
        &self,
        bundle: &Bundle,
        calls: &[ToolCall],
        quota: u32,
        counts: &mut ToolCallCounts,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if counts.executed < quota {
                counts.executed += 1;
                results.push(ToolResult {
                    name: call.name.clone(),
                    result: execute_tool(bundle, call),
                });
            } else {
                counts.denied += 1;
                debug!(tool = %call.name, "tool-call quota exhausted, returning denied stub");
                results.push(ToolResult {
                    name: call.name.clone(),
                    result: json!({"denied": true, "reason": "tool-call quota exhausted"}),
                });
            }
        }
        self.deps().metrics().counter(
            "tool_calls_total",
            &labels([("result", "executed")]),
            u64::from(counts.executed),
        );
        self.deps().metrics().counter(
            "tool_calls_total",
            &labels([("result", "denied")]),
            u64::from(counts.denied),
        );
        results
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lore tool
// ─────────────────────────────────────────────────────────────────────────────

/// The lore-fetch tool offered to the model each turn.
#[must_use]
pub fn lore_tool() -> ToolDef {
    ToolDef {
        name: LORE_TOOL.to_owned(),
        description: "Fetch one lore slice from the current world or adventure by name.".to_owned(),
        parameters: json!({
            "type": "object",
            "properties": {
                "sliceName": {"type": "string"}
            },
            "required": ["sliceName"]
        }),
    }
}

/// Resolve one tool call against the bundle. Unknown tools and unknown
/// slices degrade to an error payload, never a turn failure.
fn execute_tool(bundle: &Bundle, call: &ToolCall) -> Value {
    if call.name != LORE_TOOL {
        return json!({"error": format!("unknown tool '{}'", call.name)});
    }
    let Some(name) = call.arguments.get("sliceName").and_then(Value::as_str) else {
        return json!({"error": "missing 'sliceName' argument"});
    };
    let slice = bundle
        .world
        .iter()
        .chain(bundle.adventure.iter())
        .flat_map(|doc| doc.slices.iter())
        .find(|s| s.name == name);
    match slice {
        Some(slice) => json!({"found": true, "slice": slice}),
        None => json!({"found": false, "sliceName": name}),
    }
}
