//! Session ids and scope-local pointer handles.
//!
//! [`ScopeId`] keeps session ids apart from other strings. Ids minted here
//! are UUID v7, so they sort by creation time.
//!
//! [`Ptr`] addresses components, callbacks and properties across the wire.
//! Handles are allocated by a [`PtrAllocator`] owned by each scope, start at
//! 1 and never repeat; [`Ptr::NULL`] is the invalid sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::errors::CoreError;

/// Identifier of a client session, held by the client and reused across
/// reconnects to resume the same scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Mint a fresh time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Adopt `raw` without checking it.
    #[must_use]
    pub fn from_string(raw: String) -> Self {
        Self(raw)
    }

    /// Accept a client-supplied id, or mint a fresh one when it is missing or
    /// shorter than `min_len`.
    #[must_use]
    pub fn resolve(requested: Option<&str>, min_len: usize) -> Self {
        match requested {
            Some(id) if id.len() >= min_len => Self(id.to_owned()),
            _ => Self::new(),
        }
    }

    /// The id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ScopeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ptr
// ─────────────────────────────────────────────────────────────────────────────

/// Scope-local handle addressing a component, callback or property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ptr(u64);

impl Ptr {
    /// The invalid pointer.
    pub const NULL: Ptr = Ptr(0);

    /// Wrap a raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the invalid sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Ptr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Ptr)
            .map_err(|_| CoreError::InvalidPtr(s.to_owned()))
    }
}

/// Monotonic pointer source shared by all three pointer spaces of a scope.
#[derive(Debug, Default)]
pub struct PtrAllocator {
    last: AtomicU64,
}

impl PtrAllocator {
    /// Create an allocator whose first handle is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next handle. Never returns [`Ptr::NULL`].
    pub fn next(&self) -> Ptr {
        Ptr(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// The most recently allocated handle, or [`Ptr::NULL`].
    pub fn last(&self) -> Ptr {
        Ptr(self.last.load(Ordering::Relaxed))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestId
// ─────────────────────────────────────────────────────────────────────────────

/// Client-chosen correlation id echoed in responses. `0` means "none".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
