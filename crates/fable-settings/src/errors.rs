//! Settings errors.

use thiserror::Error;

/// Failure while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// File contained invalid JSON, or the merged document did not match
    /// the settings schema.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
