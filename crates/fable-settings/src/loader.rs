//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `FABLE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::EngineSettings;

/// Resolve the path to the settings file (`~/.fable/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".fable").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(EngineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EngineSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Floats must be finite and within range
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    // ── Budgets ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("FABLE_MAX_INPUT_TOKENS", 256, 1_000_000) {
        settings.budgets.max_input_tokens = v;
    }
    if let Some(v) = read_env_u64("FABLE_MAX_OUTPUT_TOKENS", 64, 100_000) {
        settings.budgets.max_output_tokens = v;
    }
    if let Some(v) = read_env_f64("FABLE_TEMPERATURE", 0.0, 2.0) {
        settings.budgets.temperature = v;
    }
    if let Some(v) = read_env_usize("FABLE_NPC_FLOOR", 0, 64) {
        settings.budgets.npc_floor = v;
    }
    if let Some(v) = read_env_u64("FABLE_SLICE_MAX_TOKENS", 16, 100_000) {
        settings.budgets.slice_max_tokens = v;
    }

    // ── Cache ───────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("FABLE_DOC_TTL_SECS", 1, 86_400) {
        settings.cache.doc_ttl_secs = v;
    }
    if let Some(v) = read_env_u64("FABLE_SLICE_TTL_SECS", 1, 86_400) {
        settings.cache.slice_ttl_secs = v;
    }
    if let Some(v) = read_env_usize("FABLE_CACHE_MAX_ENTRIES", 16, 1_000_000) {
        settings.cache.max_entries = v;
    }

    // ── Turn ────────────────────────────────────────────────────────
    if let Some(v) = read_env_u32("FABLE_TOOL_CALL_QUOTA", 0, 16) {
        settings.turn.tool_call_quota = v;
    }
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|s| parse_in_range_u64(&s, min, max))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|s| parse_in_range_u32(&s, min, max))
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|s| parse_in_range_usize(&s, min, max))
}

fn read_env_f64(name: &str, min: f64, max: f64) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|s| parse_in_range_f64(&s, min, max))
}

fn parse_in_range_u64(s: &str, min: u64, max: u64) -> Option<u64> {
    s.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_in_range_u32(s: &str, min: u32, max: u32) -> Option<u32> {
    s.trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_in_range_usize(s: &str, min: usize, max: usize) -> Option<usize> {
    s.trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_in_range_f64(s: &str, min: f64, max: f64) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= min && *v <= max)
}
