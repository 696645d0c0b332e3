//! Core error type.

use thiserror::Error;

/// Errors raised by the foundation types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A pointer could not be parsed from its textual form.
    #[error("invalid pointer: {0}")]
    InvalidPtr(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn invalid_ptr_display() {
        let err = CoreError::InvalidPtr("abc".into());
        assert_eq!(err.to_string(), "invalid pointer: abc");
    }

    #[test]
    fn parse_failure_maps_to_invalid_ptr() {
        let err = "-1".parse::<crate::Ptr>().unwrap_err();
        assert_matches!(err, CoreError::InvalidPtr(ref s) if s == "-1");
    }
}
