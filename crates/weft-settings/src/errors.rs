//! Failures while turning settings sources into a [`RuntimeSettings`].
//!
//! [`RuntimeSettings`]: crate::RuntimeSettings

use std::io;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("settings file unreadable: {0}")]
    Io(#[from] io::Error),
    /// The settings file is not valid JSON, or its shape does not match.
    #[error("settings file malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// The merged settings failed validation.
    #[error("settings rejected: {0}")]
    InvalidValue(String),
}

/// Shorthand used throughout this crate.
pub type Result<T, E = SettingsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_their_cause() {
        let denied = SettingsError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(denied.to_string(), "settings file unreadable: denied");

        let malformed = SettingsError::from(serde_json::from_str::<u8>("[").unwrap_err());
        assert!(malformed.to_string().starts_with("settings file malformed: "));

        let rejected = SettingsError::InvalidValue("application.locales must not be empty".into());
        assert_eq!(rejected.to_string(), "settings rejected: application.locales must not be empty");
    }
}
