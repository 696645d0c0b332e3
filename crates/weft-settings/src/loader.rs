//! Layered settings loading.
//!
//! Compiled defaults are serialized to JSON, the user file is merged over
//! them key by key, the result is deserialized, and finally `WEFT_*`
//! environment variables are applied. Objects merge recursively; arrays
//! and scalars in the file replace the default; `null` in the file leaves
//! the default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{MAX_FRAME_INTERVAL_MS, MAX_LIFETIME_SECS, MAX_SWEEP_INTERVAL_SECS, RuntimeSettings};

/// `~/.weft/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".weft")
        .join("settings.json")
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<RuntimeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file means defaults. Malformed JSON and settings that fail
/// validation are errors; malformed environment values are not.
pub fn load_settings_from_path(path: &Path) -> Result<RuntimeSettings> {
    let mut settings = read_layers(path)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<RuntimeSettings> {
    let mut merged = serde_json::to_value(RuntimeSettings::default())?;
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!(path = %path.display(), "merging settings file");
            deep_merge(&mut merged, serde_json::from_str(&text)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_value(merged)?)
}

/// Merge `overlay` into `base` in place.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

type Setter = fn(&mut RuntimeSettings, &str) -> bool;

/// Environment variables and how each one applies.
const OVERRIDES: &[(&str, Setter)] = &[
    ("WEFT_SCOPE_LIFETIME_SECS", |s, v| set_bounded(&mut s.scope.lifetime_secs, v, 1, MAX_LIFETIME_SECS)),
    ("WEFT_FRAME_INTERVAL_MS", |s, v| set_bounded(&mut s.scope.frame_interval_ms, v, 0, MAX_FRAME_INTERVAL_MS)),
    ("WEFT_STATE_RETENTION_PASSES", |s, v| {
        set_bounded(&mut s.scope.state_retention_passes, v, 0, 1_000_000)
    }),
    ("WEFT_SWEEP_INTERVAL_SECS", |s, v| {
        set_bounded(&mut s.registry.sweep_interval_secs, v, 1, MAX_SWEEP_INTERVAL_SECS)
    }),
    ("WEFT_APP_NAME", |s, v| set_text(&mut s.application.name, v)),
    ("WEFT_LOG_LEVEL", |s, v| set_text(&mut s.logging.level, v)),
];

/// Apply every `WEFT_*` override that `lookup` knows about.
///
/// Values that do not parse or fall outside their range are skipped with a
/// warning.
pub fn apply_overrides(settings: &mut RuntimeSettings, lookup: impl Fn(&str) -> Option<String>) {
    for (key, set) in OVERRIDES {
        let Some(value) = lookup(key) else {
            continue;
        };
        if !set(settings, &value) {
            warn!(key, %value, "invalid environment override ignored");
        }
    }
}

fn set_bounded(slot: &mut u64, value: &str, min: u64, max: u64) -> bool {
    match value.trim().parse::<u64>() {
        Ok(n) if (min..=max).contains(&n) => {
            *slot = n;
            true
        }
        _ => false,
    }
}

fn set_text(slot: &mut String, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value.clone_into(slot);
    true
}
