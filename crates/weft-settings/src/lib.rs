//! # weft-settings
//!
//! Runtime configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RuntimeSettings::default()`]
//! 2. **User file**: `~/.weft/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WEFT_*` overrides (highest priority)
//!
//! There is no global instance: the loaded value is handed to the scope
//! registry at construction so independent runtimes can coexist.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
