//! Game-state persistence with optimistic concurrency.
//!
//! The orchestrator loads a versioned snapshot at the start of a turn and
//! commits the new state with the version it loaded. A commit whose expected
//! version no longer matches the stored one fails with
//! [`StoreError::VersionConflict`]; the caller surfaces that as a retryable
//! turn failure rather than silently overwriting a concurrent turn.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use fable_core::ids::SessionId;

use crate::types::GameState;

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version moved underneath the caller.
    #[error("version conflict: expected {expected}, store has {actual}")]
    VersionConflict {
        /// Version the caller loaded.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The backend failed.
    #[error("state store backend error: {message}")]
    Backend {
        /// Backend-specific description.
        message: String,
    },
}

impl StoreError {
    /// Whether a retry of the whole turn could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// A game state together with its stored version.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedState {
    /// Monotonic version, starting at 1 on first commit.
    pub version: u64,
    /// The state document.
    pub state: GameState,
}

/// Persistence seam for game state.
#[async_trait]
pub trait GameStateStore: Send + Sync {
    /// Load the current state for a session, if one exists.
    async fn load(&self, session: &SessionId) -> Result<Option<VersionedState>, StoreError>;

    /// Commit a new state. `expected_version` is the version the caller
    /// loaded, or 0 when no state existed yet. Returns the new version.
    async fn commit(
        &self,
        session: &SessionId,
        state: GameState,
        expected_version: u64,
    ) -> Result<u64, StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory [`GameStateStore`], used in tests and single-process runs.
#[derive(Default)]
pub struct MemoryGameStateStore {
    inner: Mutex<HashMap<String, VersionedState>>,
    fail_next_commit: Mutex<bool>,
}

impl MemoryGameStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with a backend error. Lets tests exercise
    /// the orchestrator's apply-phase rollback path.
    pub fn fail_next_commit(&self) {
        *self.fail_next_commit.lock() = true;
    }
}

#[async_trait]
impl GameStateStore for MemoryGameStateStore {
    async fn load(&self, session: &SessionId) -> Result<Option<VersionedState>, StoreError> {
        Ok(self.inner.lock().get(session.as_str()).cloned())
    }

    async fn commit(
        &self,
        session: &SessionId,
        state: GameState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if std::mem::take(&mut *self.fail_next_commit.lock()) {
            return Err(StoreError::Backend {
                message: "injected commit failure".into(),
            });
        }

        let mut inner = self.inner.lock();
        let actual = inner.get(session.as_str()).map_or(0, |v| v.version);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let version = actual + 1;
        let _ = inner.insert(
            session.as_str().to_owned(),
            VersionedState { version, state },
        );
        Ok(version)
    }
}
