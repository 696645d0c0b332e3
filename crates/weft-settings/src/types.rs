//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields get their production default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SettingsError};

/// Upper bound of `scope.lifetimeSecs` (one day).
pub const MAX_LIFETIME_SECS: u64 = 86_400;
/// Upper bound of `scope.frameIntervalMs`.
pub const MAX_FRAME_INTERVAL_MS: u64 = 10_000;
/// Upper bound of `registry.sweepIntervalSecs` (one day).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;

/// Root settings type.
///
/// ```json
/// {
///   "scope": { "lifetimeSecs": 120 },
///   "application": { "name": "Backoffice", "locales": ["en", "de"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Per-scope behavior.
    pub scope: ScopeSettings,
    /// Scope registry behavior.
    pub registry: RegistrySettings,
    /// Values announced to clients during configuration negotiation.
    pub application: ApplicationSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RuntimeSettings {
    /// Reject combinations the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        check_range("scope.lifetimeSecs", self.scope.lifetime_secs, 1, MAX_LIFETIME_SECS)?;
        check_range("scope.frameIntervalMs", self.scope.frame_interval_ms, 0, MAX_FRAME_INTERVAL_MS)?;
        check_range(
            "registry.sweepIntervalSecs",
            self.registry.sweep_interval_secs,
            1,
            MAX_SWEEP_INTERVAL_SECS,
        )?;
        if self.application.locales.is_empty() {
            return Err(SettingsError::InvalidValue(
                "application.locales must not be empty".into(),
            ));
        }
        if !self
            .application
            .locales
            .iter()
            .any(|l| l == &self.application.default_locale)
        {
            return Err(SettingsError::InvalidValue(format!(
                "application.defaultLocale '{}' is not one of application.locales",
                self.application.default_locale
            )));
        }
        Ok(())
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!("{key} must be within {min}..={max}, got {value}")))
    }
}

/// Per-scope settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeSettings {
    /// Sliding idle window after which a scope is destroyed.
    pub lifetime_secs: u64,
    /// Period of the pump that drains the event loop; `0` disables it.
    pub frame_interval_ms: u64,
    /// Render passes a state may go unused before it is destroyed; `0` keeps
    /// states for the component's lifetime.
    pub state_retention_passes: u64,
    /// Client-supplied scope ids shorter than this are replaced.
    pub min_scope_id_len: usize,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            lifetime_secs: 60,
            frame_interval_ms: 16,
            state_retention_passes: 0,
            min_scope_id_len: 32,
        }
    }
}

impl ScopeSettings {
    /// Sliding idle window, capped at [`MAX_LIFETIME_SECS`].
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs.min(MAX_LIFETIME_SECS))
    }

    /// Pump period, if the pump is enabled. Capped at [`MAX_FRAME_INTERVAL_MS`].
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_interval_ms > 0)
            .then(|| Duration::from_millis(self.frame_interval_ms.min(MAX_FRAME_INTERVAL_MS)))
    }
}

/// Registry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Period of the expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

impl RegistrySettings {
    /// Period of the expiry sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.min(MAX_SWEEP_INTERVAL_SECS))
    }
}

/// Application identity announced to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationSettings {
    /// Display name.
    pub name: String,
    /// Supported locale tags.
    pub locales: Vec<String>,
    /// Locale used when negotiation finds no match.
    pub default_locale: String,
    /// Theme definitions passed through verbatim.
    pub themes: Value,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "weft".to_string(),
            locales: vec!["en".to_string()],
            default_locale: "en".to_string(),
            themes: Value::Object(serde_json::Map::new()),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level for the stderr subscriber.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
