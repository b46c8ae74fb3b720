//! Game state, the act vocabulary, and the act interpreter.
//!
//! This crate owns everything that changes when a turn is applied: the
//! three-tier [`types::GameState`], the typed [`acts::Act`] vocabulary the
//! model emits, the pure [`interpreter::apply_acts`] function that folds an
//! acts array into a new state, and the [`store::GameStateStore`] seam that
//! persists the result under optimistic versioning.

#![deny(unsafe_code)]

pub mod acts;
pub mod interpreter;
pub mod store;
pub mod types;

pub use acts::{Act, ParsedAct};
pub use interpreter::{ApplyOutcome, ApplySummary, Violation, apply_acts, validate_contract};
pub use store::{GameStateStore, MemoryGameStateStore, StoreError, VersionedState};
pub use types::{GameState, GameTime, MemoryEntry, Objective, TimeBand, TurnKind};
