//! Registry of live scopes with idle expiry.
//!
//! Transports call [`Scopes::connect`] for every new connection. A client
//! that presents the id of a live scope resumes it on the new channel;
//! anything else gets a fresh scope. A background sweeper destroys scopes
//! whose end of life has passed.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use weft_core::ScopeId;
use weft_settings::RuntimeSettings;

use crate::channel::Channel;
use crate::component::Factories;
use crate::errors::RuntimeError;
use crate::scope::Scope;
use crate::subject::{AnonymousProvider, SubjectProvider};

/// All scopes of one runtime.
pub struct Scopes {
    scopes: DashMap<ScopeId, Arc<Scope>>,
    factories: Arc<Factories>,
    settings: RuntimeSettings,
    subjects: Arc<dyn SubjectProvider>,
    cancel: CancellationToken,
}

impl Scopes {
    /// Empty registry. New scopes start with an anonymous subject.
    pub fn new(factories: Factories, settings: RuntimeSettings) -> Self {
        Self {
            scopes: DashMap::new(),
            factories: Arc::new(factories),
            settings,
            subjects: Arc::new(AnonymousProvider),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `provider` to pick the initial subject of new scopes.
    #[must_use]
    pub fn with_subject_provider(mut self, provider: Arc<dyn SubjectProvider>) -> Self {
        self.subjects = provider;
        self
    }

    /// Resume or create the scope for `requested` and attach `channel`.
    ///
    /// Ids shorter than the configured minimum are replaced by a fresh one;
    /// the returned scope's id is the one the client must keep.
    pub fn connect(&self, channel: Arc<dyn Channel>, requested: Option<&str>) -> Result<Arc<Scope>, RuntimeError> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::ScopeDestroyed);
        }
        let id = ScopeId::resolve(requested, self.settings.scope.min_scope_id_len);
        let scope = match self.scopes.entry(id.clone()) {
            Entry::Occupied(entry) if !entry.get().is_destroyed() => {
                counter!("scopes_resumed_total").increment(1);
                debug!(scope_id = %id, "scope resumed");
                entry.get().clone()
            }
            Entry::Occupied(mut entry) => {
                let scope = self.create(id)?;
                let _stale = entry.insert(scope.clone());
                gauge!("scopes_active").decrement(1.0);
                scope
            }
            Entry::Vacant(entry) => {
                let scope = self.create(id)?;
                let _ = entry.insert(scope.clone());
                scope
            }
        };
        scope.connect(channel);
        scope.tick();
        Ok(scope)
    }

    fn create(&self, id: ScopeId) -> Result<Arc<Scope>, RuntimeError> {
        let subject = self.subjects.subject_for(&id);
        let scope = Arc::new(Scope::new(id, self.factories.clone(), &self.settings, subject)?);
        counter!("scopes_created_total").increment(1);
        gauge!("scopes_active").increment(1.0);
        Ok(scope)
    }

    /// Live scope by id.
    pub fn get(&self, id: &ScopeId) -> Option<Arc<Scope>> {
        self.scopes.get(id).map(|entry| entry.value().clone())
    }

    /// Number of registered scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scope is registered.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Registered ids.
    pub fn ids(&self) -> Vec<ScopeId> {
        self.scopes.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Settings scopes are created with.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Destroy and remove every scope that expired by `now` or was already
    /// destroyed. Never blocks on a scope's loop. Returns how many went.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let candidates: Vec<ScopeId> = self
            .scopes
            .iter()
            .filter(|entry| entry.value().is_destroyed() || entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in candidates {
            let Some((_, scope)) = self
                .scopes
                .remove_if(&id, |_, scope| scope.is_destroyed() || scope.is_expired(now))
            else {
                continue;
            };
            let expired = !scope.is_destroyed();
            scope.destroy();
            removed += 1;
            gauge!("scopes_active").decrement(1.0);
            if expired {
                counter!("scopes_expired_total").increment(1);
                info!(scope_id = %id, "scope expired");
            }
        }
        removed
    }

    /// [`sweep_at`](Self::sweep_at) the current instant.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Sweep periodically on the current tokio runtime until
    /// [`destroy`](Self::destroy) or the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let interval = self.settings.registry.sweep_interval();
        tokio::spawn(run_sweeper(Arc::downgrade(self), interval, self.cancel.clone()))
    }

    /// Destroy every scope and stop the sweeper. Idempotent.
    pub fn destroy(&self) {
        self.cancel.cancel();
        let ids = self.ids();
        let count = ids.len();
        for id in ids {
            if let Some((_, scope)) = self.scopes.remove(&id) {
                scope.destroy();
                gauge!("scopes_active").decrement(1.0);
            }
        }
        if count > 0 {
            info!(scopes = count, "all scopes destroyed");
        }
    }
}

impl Drop for Scopes {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run_sweeper(scopes: Weak<Scopes>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval(interval);
    // The first tick completes immediately.
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(scopes) = scopes.upgrade() else {
                    break;
                };
                let removed = scopes.sweep();
                if removed > 0 {
                    debug!(removed, remaining = scopes.len(), "sweep finished");
                }
            }
            () = cancel.cancelled() => break,
        }
    }
    debug!("sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use weft_settings::ScopeSettings;

    const LONG_ID: &str = "0123456789abcdef0123456789abcdef";

    fn settings() -> RuntimeSettings {
        RuntimeSettings {
            scope: ScopeSettings {
                frame_interval_ms: 0,
                ..ScopeSettings::default()
            },
            ..RuntimeSettings::default()
        }
    }

    fn registry() -> Scopes {
        Scopes::new(Factories::new(), settings())
    }

    #[test]
    fn connect_creates_scope() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let scope = scopes.connect(channel.clone(), None).unwrap();
        assert_eq!(scopes.len(), 1);
        assert!(scope.is_connected());
        assert!(channel.is_subscribed());
        assert!(scopes.get(scope.id()).is_some());
    }

    #[test]
    fn known_id_resumes_scope() {
        let scopes = registry();
        let (first, _rx1) = MemoryChannel::new();
        let (second, _rx2) = MemoryChannel::new();
        let a = scopes.connect(first.clone(), Some(LONG_ID)).unwrap();
        let b = scopes.connect(second.clone(), Some(LONG_ID)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id().as_str(), LONG_ID);
        assert!(!first.is_subscribed());
        assert!(second.is_subscribed());
        assert_eq!(scopes.len(), 1);
    }

    #[test]
    fn short_id_is_replaced() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let scope = scopes.connect(channel, Some("abc")).unwrap();
        assert_ne!(scope.id().as_str(), "abc");
        assert!(scope.id().as_str().len() >= 32);
    }

    #[test]
    fn destroyed_scope_is_replaced_on_connect() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let old = scopes.connect(channel.clone(), Some(LONG_ID)).unwrap();
        old.destroy();
        let new = scopes.connect(channel, Some(LONG_ID)).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.is_destroyed());
    }

    #[test]
    fn sweep_removes_expired_scopes_only() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let scope = scopes.connect(channel, None).unwrap();

        assert_eq!(scopes.sweep_at(Instant::now()), 0);
        let later = scope.eol() + Duration::from_secs(1);
        assert_eq!(scopes.sweep_at(later), 1);
        assert!(scopes.is_empty());
        assert!(scope.is_destroyed());
    }

    #[test]
    fn sweep_removes_destroyed_scopes() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let scope = scopes.connect(channel, None).unwrap();
        scope.destroy();
        assert_eq!(scopes.sweep_at(Instant::now()), 1);
        assert!(scopes.is_empty());
    }

    #[test]
    fn destroy_clears_registry_and_refuses_connects() {
        let scopes = registry();
        let (channel, _rx) = MemoryChannel::new();
        let scope = scopes.connect(channel.clone(), None).unwrap();
        scopes.destroy();
        scopes.destroy();
        assert!(scopes.is_empty());
        assert!(scope.is_destroyed());
        assert!(scopes.connect(channel, None).is_err());
    }

    #[tokio::test]
    async fn sweeper_stops_on_destroy() {
        let scopes = Arc::new(registry());
        let handle = scopes.spawn_sweeper();
        scopes.destroy();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_when_registry_dropped() {
        let mut s = settings();
        s.registry.sweep_interval_secs = 1;
        let scopes = Arc::new(Scopes::new(Factories::new(), s));
        let handle = scopes.spawn_sweeper();
        drop(scopes);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
