//! Bundle assembly and the token budget enforcer.
//!
//! The assembler resolves and compacts the documents of record into one
//! immutable per-turn [`types::Bundle`], executes the injection map, and
//! runs the staged [`enforcer`] cascade so the bundle is guaranteed to fit
//! the input ceiling before any model call is attempted.

#![deny(unsafe_code)]

pub mod assembler;
pub mod compactor;
pub mod doc_compact;
pub mod enforcer;
pub mod injection;
pub mod types;

pub use assembler::{AssemblerDeps, BundleAssembler};
pub use compactor::compact_slice;
pub use enforcer::{enforce_input_budget, enforce_output_budget, model_config};
pub use types::{Assembled, AssembleMetrics, Bundle, BundleMeta, CompactDoc, NpcView, SliceView};
