//! Registry-level behaviour: creation, resumption and idle expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::Level;

use weft_core::ScopeId;
use weft_core::logging::capture_logs;
use weft_protocol::RenderTree;
use weft_runtime::{
    Factories, MemoryChannel, NewComponentRequest, Scopes, StaticSubject, Subject, SubjectProvider, Window,
    component,
};
use weft_settings::RuntimeSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

fn settings(lifetime_secs: u64) -> RuntimeSettings {
    let mut s = RuntimeSettings::default();
    s.scope.lifetime_secs = lifetime_secs;
    s.scope.frame_interval_ms = 0;
    s.registry.sweep_interval_secs = 1;
    s
}

struct ByScope;

impl SubjectProvider for ByScope {
    fn subject_for(&self, scope: &ScopeId) -> Arc<dyn Subject> {
        Arc::new(StaticSubject::new(format!("svc-{}", &scope.as_str()[..4]), "service"))
    }
}

#[test]
fn provider_picks_initial_subject() {
    let scopes = Scopes::new(Factories::new(), settings(60)).with_subject_provider(Arc::new(ByScope));
    let (channel, _rx) = MemoryChannel::new();
    let scope = scopes.connect(channel, None).unwrap();
    let subject = scope.subject();
    assert!(subject.valid());
    assert_eq!(subject.name(), "service");
    assert_eq!(subject.id(), format!("svc-{}", &scope.id().as_str()[..4]));
}

#[test]
fn expiry_is_logged_and_counted_once() {
    let (logs, _guard) = capture_logs();
    let scopes = Scopes::new(Factories::new(), settings(60));
    let (channel, _rx) = MemoryChannel::new();
    let scope = scopes.connect(channel, None).unwrap();

    let later = scope.eol() + Duration::from_secs(1);
    assert_eq!(scopes.sweep_at(later), 1);
    assert_eq!(scopes.sweep_at(later), 0);
    assert!(logs.has_event(Level::INFO, "scope expired"));
    assert_eq!(logs.field_of("scope expired", "scope_id").as_deref(), Some(scope.id().as_str()));
}

#[test]
fn resumed_scope_keeps_components() {
    let factories = Factories::new().with("hello", |_: &Window, _: &NewComponentRequest| {
        Some(component(|_| RenderTree::new(json!({"text": "hello"}))))
    });
    let scopes = Scopes::new(factories, settings(60));
    let (first, _rx1) = MemoryChannel::new();
    let scope = scopes.connect(first, None).unwrap();
    let id = scope.id().as_str().to_owned();

    let (second, mut rx2) = MemoryChannel::new();
    let resumed = scopes.connect(second.clone(), Some(&id)).unwrap();
    assert_eq!(resumed.id().as_str(), id);
    second
        .deliver(br#"{"type":"component.new","requestId":1,"factory":"hello"}"#)
        .unwrap();

    let deadline = Instant::now() + TIMEOUT;
    let bytes = loop {
        if let Ok(bytes) = rx2.try_recv() {
            break bytes;
        }
        assert!(Instant::now() < deadline, "no render within timeout");
        std::thread::sleep(Duration::from_millis(5));
    };
    let event: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(event["tree"]["text"], "hello");
}

#[test]
fn tick_defers_expiry() {
    let scopes = Scopes::new(Factories::new(), settings(60));
    let (channel, _rx) = MemoryChannel::new();
    let scope = scopes.connect(channel, None).unwrap();
    let first_eol = scope.eol();

    std::thread::sleep(Duration::from_millis(20));
    scope.tick();
    assert!(scope.eol() > first_eol);
    assert_eq!(scopes.sweep_at(first_eol), 0);
    assert!(!scope.is_destroyed());
}

#[test]
fn unvalidated_huge_lifetime_is_capped() {
    let scopes = Scopes::new(Factories::new(), settings(u64::MAX));
    let (channel, _rx) = MemoryChannel::new();
    let scope = scopes.connect(channel, None).unwrap();
    scope.tick();

    let cap = Duration::from_secs(weft_settings::MAX_LIFETIME_SECS);
    assert!(scope.eol() <= Instant::now() + cap);
    assert_eq!(scopes.sweep_at(scope.eol() + Duration::from_secs(1)), 1);
}

#[tokio::test]
async fn sweeper_expires_idle_scopes() {
    let scopes = Arc::new(Scopes::new(Factories::new(), settings(1)));
    let handle = scopes.spawn_sweeper();
    let (channel, _rx) = MemoryChannel::new();
    let scope = scopes.connect(channel.clone(), None).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while !scopes.is_empty() {
        assert!(Instant::now() < deadline, "scope never expired");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(scope.is_destroyed());
    assert!(!channel.is_subscribed());

    scopes.destroy();
    tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
}
