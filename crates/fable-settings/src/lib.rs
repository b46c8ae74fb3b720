//! # fable-settings
//!
//! Engine settings with layered loading:
//!
//! 1. Compiled defaults ([`EngineSettings::default`])
//! 2. JSON settings file, deep-merged over defaults
//! 3. `FABLE_*` environment variable overrides with strict parsing

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{BudgetSettings, CacheSettings, EngineSettings, TurnSettings};
