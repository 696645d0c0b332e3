//! Error codes carried by `ServerEvent::ErrorOccurred`.

/// Inbound bytes could not be decoded.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
/// No callback or property is registered under the pointer.
pub const NO_SUCH_POINTER: &str = "NO_SUCH_POINTER";
/// No component is allocated under the pointer.
pub const NO_SUCH_COMPONENT: &str = "NO_SUCH_COMPONENT";
/// Neither the requested factory nor the not-found fallback is registered.
pub const NO_SUCH_FACTORY: &str = "NO_SUCH_FACTORY";
/// A factory ran but produced no component.
pub const FACTORY_FAILED: &str = "FACTORY_FAILED";
/// A property value could not be parsed into the property's type.
pub const INVALID_VALUE: &str = "INVALID_VALUE";
/// The addressed state or scope was already destroyed.
pub const DESTROYED: &str = "DESTROYED";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
