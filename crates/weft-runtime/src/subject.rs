//! Authenticated principal of a scope.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use weft_core::ScopeId;

/// The principal a scope acts on behalf of.
pub trait Subject: Send + Sync + fmt::Debug {
    /// Stable principal id; empty when anonymous.
    fn id(&self) -> &str;
    /// Display name.
    fn name(&self) -> &str;
    /// Whether the principal is authenticated.
    fn valid(&self) -> bool;
    /// Whether the principal holds `permission`.
    fn has_permission(&self, permission: &str) -> bool;
}

/// The unauthenticated principal every scope starts with.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anonymous;

impl Subject for Anonymous {
    fn id(&self) -> &str {
        ""
    }

    fn name(&self) -> &str {
        "anonymous"
    }

    fn valid(&self) -> bool {
        false
    }

    fn has_permission(&self, _permission: &str) -> bool {
        false
    }
}

/// A fixed principal with an explicit permission set.
#[derive(Clone, Debug, Default)]
pub struct StaticSubject {
    id: String,
    name: String,
    permissions: HashSet<String>,
}

impl StaticSubject {
    /// Create a valid principal.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            permissions: HashSet::new(),
        }
    }

    /// Grant a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        let _ = self.permissions.insert(permission.into());
        self
    }
}

impl Subject for StaticSubject {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn valid(&self) -> bool {
        !self.id.is_empty()
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Chooses the initial subject of a newly created scope.
pub trait SubjectProvider: Send + Sync {
    /// Subject for `scope`.
    fn subject_for(&self, scope: &ScopeId) -> Arc<dyn Subject>;
}

/// Hands out [`Anonymous`] to every scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousProvider;

impl SubjectProvider for AnonymousProvider {
    fn subject_for(&self, _scope: &ScopeId) -> Arc<dyn Subject> {
        Arc::new(Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_is_invalid() {
        let s = Anonymous;
        assert!(!s.valid());
        assert!(s.id().is_empty());
        assert!(!s.has_permission("admin"));
    }

    #[test]
    fn static_subject_permissions() {
        let s = StaticSubject::new("u-1", "Alice").with_permission("orders.read");
        assert!(s.valid());
        assert_eq!(s.name(), "Alice");
        assert!(s.has_permission("orders.read"));
        assert!(!s.has_permission("orders.write"));
    }

    #[test]
    fn provider_hands_out_anonymous() {
        let subject = AnonymousProvider.subject_for(&ScopeId::new());
        assert!(!subject.valid());
    }
}
