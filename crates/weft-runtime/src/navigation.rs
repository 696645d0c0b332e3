//! Client-side navigation requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use weft_protocol::ServerEvent;

use crate::scope::ScopeCore;

/// Publishes navigation events to the scope's client.
#[derive(Clone)]
pub struct Navigation {
    core: Arc<ScopeCore>,
}

impl Navigation {
    pub(crate) fn new(core: Arc<ScopeCore>) -> Self {
        Self { core }
    }

    /// Push a new page built by `factory`.
    pub fn forward_to<K, V>(&self, factory: impl Into<String>, values: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.core.publish(&ServerEvent::NavigationForwardToRequested {
            factory: factory.into(),
            values: collect_values(values),
        });
    }

    /// Pop the current page.
    pub fn back(&self) {
        self.core.publish(&ServerEvent::NavigationBackRequested);
    }

    /// Replace the whole history with one page.
    pub fn reset_to<K, V>(&self, factory: impl Into<String>, values: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.core.publish(&ServerEvent::NavigationResetRequested {
            factory: factory.into(),
            values: collect_values(values),
        });
    }

    /// Reload the current page.
    pub fn reload(&self) {
        self.core.publish(&ServerEvent::NavigationReloadRequested);
    }
}

fn collect_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    values.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
