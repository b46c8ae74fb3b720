//! # fable-tokens
//!
//! Deterministic token estimation and budget result types.
//!
//! Estimation is intentionally approximate (chars/4 over the serialized
//! form) but **monotonic**: trimming content never raises the estimate.
//! That property is what lets the budget enforcer's staged cascade
//! provably converge or exhaust.

#![deny(unsafe_code)]

pub mod budget;
pub mod estimator;

pub use budget::{BudgetResult, ModelConfig, OutputBudgetCheck, Reduction, ReductionKind};
pub use estimator::{
    CHARS_PER_TOKEN, chars_to_tokens, estimate_json_tokens, estimate_text_tokens,
    estimate_value_tokens,
};
