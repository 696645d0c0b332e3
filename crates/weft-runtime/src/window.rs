//! Per-component session facade.
//!
//! A [`Window`] is handed to the factory that builds a component and stays
//! with that component until it is destroyed. It is the component's only way
//! to reach its scope: state lookup, invalidation, navigation, server-side
//! calls to the client, and deferred work on the loop thread.
//!
//! Windows are cheap to clone and may be moved to other threads. Anything
//! that must run on the scope's loop goes through [`Window::execute`].

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};
use weft_core::{Ptr, PtrAllocator, RequestId, ScopeId};
use weft_protocol::{CallArgs, ImportedFile, ServerEvent, WindowInfo};

use crate::async_call::PendingCalls;
use crate::navigation::Navigation;
use crate::scope::ScopeCore;
use crate::state::{Property, State, StateValue};
use crate::subject::Subject;

struct StateEntry {
    handle: Box<dyn Any + Send + Sync>,
    prop: Arc<dyn Property>,
}

type CallSite = (&'static str, u32, u32);

struct WindowInner {
    core: Arc<ScopeCore>,
    component: Ptr,
    factory: String,
    values: BTreeMap<String, String>,
    generation: Arc<AtomicU64>,
    invalidated: AtomicBool,
    destroyed: AtomicBool,
    states: Mutex<HashMap<String, StateEntry>>,
    call_sites: Mutex<HashMap<CallSite, u32>>,
    calls: Mutex<PendingCalls>,
}

/// Handle to the scope services of one component.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

/// Options of [`Window::import_files`].
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Allow more than one file.
    pub multiple: bool,
    /// Accepted MIME types; empty accepts anything.
    pub accepted_mime_types: Vec<String>,
    /// Per-file size limit; larger files are dropped.
    pub max_bytes: Option<u64>,
}

/// Cancels a pending [`Window::async_call`].
#[derive(Debug)]
pub struct CancelHandle {
    ptr: Ptr,
    window: Weak<WindowInner>,
}

impl CancelHandle {
    /// Correlation pointer of the call.
    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// Forget the callback. Returns whether it was still pending.
    pub fn cancel(self) -> bool {
        self.window
            .upgrade()
            .is_some_and(|window| window.calls.lock().cancel(self.ptr))
    }
}

impl fmt::Debug for WindowInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("component", &self.component)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl Window {
    pub(crate) fn new(
        core: Arc<ScopeCore>,
        component: Ptr,
        factory: String,
        values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            inner: Arc::new(WindowInner {
                core,
                component,
                factory,
                values,
                generation: Arc::new(AtomicU64::new(0)),
                invalidated: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                states: Mutex::new(HashMap::new()),
                call_sites: Mutex::new(HashMap::new()),
                calls: Mutex::new(PendingCalls::default()),
            }),
        }
    }

    // ── identity ────────────────────────────────────────────────────

    /// Pointer of the component this window belongs to.
    pub fn component(&self) -> Ptr {
        self.inner.component
    }

    /// Factory id the component was built from.
    pub fn factory(&self) -> &str {
        &self.inner.factory
    }

    /// Navigation values the component was requested with.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.inner.values
    }

    /// Single navigation value.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.inner.values.get(key).map(String::as_str)
    }

    /// Owning scope.
    pub fn scope_id(&self) -> &ScopeId {
        &self.inner.core.id
    }

    /// Number of render passes started so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub(crate) fn ptrs(&self) -> &PtrAllocator {
        &self.inner.core.ptrs
    }

    // ── rendering ───────────────────────────────────────────────────

    /// Mark the component for re-render.
    pub fn invalidate(&self) {
        if self.is_destroyed() {
            return;
        }
        self.inner.invalidated.store(true, Ordering::Release);
        self.inner.core.request_render();
    }

    /// Whether a re-render is pending.
    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    /// Run `task` on the scope's loop, then render whatever it invalidated.
    ///
    /// From a foreign thread this also ticks the loop, blocking until the
    /// task is handed over.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        let core = &self.inner.core;
        core.event_loop.post(move |state| {
            task();
            state.render_invalidated(RequestId::default());
        });
        if !core.event_loop.is_loop_thread() {
            core.event_loop.tick();
        }
    }

    pub(crate) fn begin_pass(&self) {
        let previous = self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let stale = self.inner.calls.lock().evict_older_than(previous);
        if stale > 0 {
            debug!(component = %self.inner.component, stale, "stale calls dropped");
        }
        self.inner.call_sites.lock().clear();
        self.inner.invalidated.store(false, Ordering::Release);
    }

    pub(crate) fn end_pass(&self) {
        let retention = self.inner.core.settings.state_retention_passes;
        if retention == 0 {
            return;
        }
        let current = self.generation();
        let expired: Vec<Arc<dyn Property>> = {
            let mut states = self.inner.states.lock();
            let ids: Vec<String> = states
                .iter()
                .filter(|(_, e)| current.saturating_sub(e.prop.generation()) >= retention)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| states.remove(id))
                .map(|e| e.prop)
                .collect()
        };
        if !expired.is_empty() {
            debug!(component = %self.inner.component, count = expired.len(), "unused states destroyed");
        }
        for prop in expired {
            prop.destroy();
        }
    }

    // ── state ───────────────────────────────────────────────────────

    /// State registered under `id`, created with `T::default()` on first use.
    pub fn state_of<T: StateValue + Default>(&self, id: &str) -> State<T> {
        self.lookup(id.to_owned(), T::default)
    }

    /// State registered under `id`, created with `init` on first use.
    pub fn state_of_or<T: StateValue>(&self, id: &str, init: impl FnOnce() -> T) -> State<T> {
        self.lookup(id.to_owned(), init)
    }

    /// State identified by its call site.
    ///
    /// The identity is the source location plus the number of earlier calls
    /// from that location in the current render pass. A location that runs a
    /// varying number of times keeps its states by position, so dropping the
    /// first item of a loop hands the second item the first item's state.
    /// Other locations are unaffected. Key such states with
    /// [`state_of`](Self::state_of) and a domain id instead.
    #[track_caller]
    pub fn auto_state<T: StateValue + Default>(&self) -> State<T> {
        let id = self.auto_id(Location::caller());
        self.lookup(id, T::default)
    }

    /// Like [`auto_state`](Self::auto_state) with an explicit initializer.
    #[track_caller]
    pub fn auto_state_or<T: StateValue>(&self, init: impl FnOnce() -> T) -> State<T> {
        let id = self.auto_id(Location::caller());
        self.lookup(id, init)
    }

    fn auto_id(&self, caller: &'static Location<'static>) -> String {
        let site = (caller.file(), caller.line(), caller.column());
        let mut sites = self.inner.call_sites.lock();
        let n = sites.entry(site).or_insert(0);
        let occurrence = *n;
        *n += 1;
        format!("auto:{}:{}:{}#{occurrence}", site.0, site.1, site.2)
    }

    fn lookup<T: StateValue>(&self, id: String, init: impl FnOnce() -> T) -> State<T> {
        if let Some(state) = self.live_state(&id) {
            return state;
        }
        // No lock is held here: initializers may look up sibling states.
        let value = init();

        let (state, replaced) = {
            let mut states = self.inner.states.lock();
            if let Some(state) = states
                .get(&id)
                .filter(|e| !e.prop.is_destroyed())
                .and_then(|e| e.handle.downcast_ref::<State<T>>())
            {
                state.revalidate();
                return state.clone();
            }
            let state = State::new(
                self.inner.core.ptrs.next(),
                id.clone(),
                self.inner.generation.clone(),
                value,
            );
            if self.is_destroyed() {
                state.destroy();
            }
            let replaced = states.insert(
                id,
                StateEntry {
                    handle: Box::new(state.clone()),
                    prop: Arc::new(state.clone()),
                },
            );
            (state, replaced.map(|e| e.prop))
        };
        if let Some(old) = replaced {
            old.destroy();
        }
        state
    }

    /// Live state under `id` if it holds a `T`. A state of another type is
    /// removed and destroyed.
    fn live_state<T: StateValue>(&self, id: &str) -> Option<State<T>> {
        let mismatched = {
            let mut states = self.inner.states.lock();
            let entry = states.get(id)?;
            match entry.handle.downcast_ref::<State<T>>() {
                Some(state) if !entry.prop.is_destroyed() => {
                    state.revalidate();
                    return Some(state.clone());
                }
                Some(_) => return None,
                None => {
                    error!(
                        component = %self.inner.component,
                        state_id = %id,
                        "state looked up with a different type, replacing"
                    );
                    states.remove(id).map(|e| e.prop)
                }
            }
        };
        if let Some(old) = mismatched {
            old.destroy();
        }
        None
    }

    /// Number of live states.
    pub fn state_count(&self) -> usize {
        self.inner.states.lock().len()
    }

    // ── session ─────────────────────────────────────────────────────

    /// Navigation requests to the client.
    pub fn navigation(&self) -> Navigation {
        Navigation::new(self.inner.core.clone())
    }

    /// Principal the scope acts for.
    pub fn subject(&self) -> Arc<dyn Subject> {
        self.inner.core.session.read().subject.clone()
    }

    /// Replace the scope's subject and re-render every component.
    pub fn update_subject(&self, subject: Arc<dyn Subject>) {
        debug!(scope_id = %self.inner.core.id, subject = subject.id(), "subject updated");
        self.inner.core.session.write().subject = subject;
        self.inner.core.request_full_render();
        if !self.inner.core.event_loop.is_loop_thread() {
            self.execute(|| {});
        }
    }

    /// Negotiated locale.
    pub fn locale(&self) -> String {
        self.inner.core.session.read().locale.clone()
    }

    /// Negotiated timezone.
    pub fn timezone(&self) -> Tz {
        self.inner.core.session.read().timezone
    }

    /// Current time in the negotiated timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone())
    }

    /// Last reported viewport metrics.
    pub fn window_info(&self) -> WindowInfo {
        self.inner.core.session.read().window_info.clone()
    }

    // ── client calls ────────────────────────────────────────────────

    /// Ask the client to perform `args`; `callback` runs on the loop thread
    /// with the answer.
    ///
    /// Calls issued more than one render pass ago are forgotten, and their
    /// late answers ignored.
    pub fn async_call(&self, args: CallArgs, callback: impl FnOnce(Value) + Send + 'static) -> CancelHandle {
        let ptr = self.inner.core.ptrs.next();
        let generation = self.generation();
        self.inner.calls.lock().insert(ptr, generation, Box::new(callback));
        self.inner.core.publish(&ServerEvent::CallRequested { ptr, call: args });
        CancelHandle {
            ptr,
            window: Arc::downgrade(&self.inner),
        }
    }

    /// Ask the client to upload files.
    ///
    /// `on_files` gets an empty list when the user cancels or the answer is
    /// malformed. Files over `max_bytes` are dropped.
    pub fn import_files(
        &self,
        options: ImportOptions,
        on_files: impl FnOnce(Vec<ImportedFile>) + Send + 'static,
    ) -> CancelHandle {
        let max_bytes = options.max_bytes;
        let args = CallArgs::ImportFiles {
            multiple: options.multiple,
            accepted_mime_types: options.accepted_mime_types,
            max_bytes,
        };
        self.async_call(args, move |ret| {
            let files = match ret {
                Value::Null => Vec::new(),
                other => serde_json::from_value::<Vec<ImportedFile>>(other).unwrap_or_else(|e| {
                    warn!(error = %e, "malformed file import answer");
                    Vec::new()
                }),
            };
            let files = files
                .into_iter()
                .filter(|file| within_limit(file, max_bytes))
                .collect();
            on_files(files);
        })
    }

    /// Offer `bytes` to the client as a download.
    pub fn export_file(&self, name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) {
        self.inner.core.publish(&ServerEvent::FileExportRequested {
            name: name.into(),
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        });
    }

    /// Copy text to the client clipboard.
    pub fn clipboard_write(&self, text: impl Into<String>) {
        self.inner
            .core
            .publish(&ServerEvent::ClipboardWriteRequested { text: text.into() });
    }

    /// Ask the client to open a resource.
    pub fn open(&self, resource: impl Into<String>, options: BTreeMap<String, String>) {
        self.inner.core.publish(&ServerEvent::OpenRequested {
            resource: resource.into(),
            options,
        });
    }

    pub(crate) fn take_call(&self, ptr: Ptr) -> Option<Box<dyn FnOnce(Value) + Send>> {
        self.inner.calls.lock().take(ptr)
    }

    /// Calls awaiting an answer.
    pub fn pending_calls(&self) -> usize {
        self.inner.calls.lock().len()
    }

    // ── teardown ────────────────────────────────────────────────────

    /// Whether the component was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Destroy every state and forget pending calls. Idempotent.
    pub(crate) fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let states: Vec<StateEntry> = self.inner.states.lock().drain().map(|(_, e)| e).collect();
        for entry in &states {
            entry.prop.destroy();
        }
        self.inner.calls.lock().clear();
        self.inner.call_sites.lock().clear();
    }
}

fn within_limit(file: &ImportedFile, max_bytes: Option<u64>) -> bool {
    let Some(max) = max_bytes else {
        return true;
    };
    match file.bytes() {
        Ok(bytes) if (bytes.len() as u64) <= max => true,
        Ok(bytes) => {
            warn!(file = %file.name, size = bytes.len(), max, "imported file too large, dropped");
            false
        }
        Err(e) => {
            warn!(file = %file.name, error = %e, "imported file not decodable, dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Factories;
    use crate::scope::Scope;
    use crate::subject::Anonymous;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use weft_settings::{RuntimeSettings, ScopeSettings};

    fn window() -> (Scope, Window) {
        let settings = RuntimeSettings {
            scope: ScopeSettings {
                frame_interval_ms: 0,
                ..ScopeSettings::default()
            },
            ..RuntimeSettings::default()
        };
        let scope = Scope::new(ScopeId::new(), Arc::new(Factories::new()), &settings, Arc::new(Anonymous)).unwrap();
        let window = Window::new(scope.core().clone(), Ptr::from_raw(1), "test".into(), BTreeMap::new());
        (scope, window)
    }

    /// One render pass: `looped` calls from one site, then one sibling call.
    fn pass(window: &Window, looped: usize) -> (Vec<Ptr>, Ptr) {
        window.begin_pass();
        let ptrs = (0..looped).map(|_| window.auto_state::<u32>().ptr()).collect();
        let sibling = window.auto_state::<String>().ptr();
        window.end_pass();
        (ptrs, sibling)
    }

    #[test]
    fn nested_initializer_sees_sibling_state() {
        let (_scope, window) = window();
        let w = window.clone();
        let derived = window.state_of_or("derived", || w.state_of_or("base", || 41_u32).get() + 1);
        assert_eq!(derived.get(), 42);
        assert_eq!(window.state_of::<u32>("base").get(), 41);
        assert_eq!(window.state_count(), 2);
    }

    #[test]
    fn initializer_runs_once_per_id() {
        let (_scope, window) = window();
        let runs = AtomicUsize::new(0);
        let init = || {
            let _ = runs.fetch_add(1, Ordering::SeqCst);
            7_i64
        };
        let first = window.state_of_or("seed", init);
        first.set(8);
        let again = window.state_of_or::<i64>("seed", || unreachable!("initializer ran twice"));
        assert_eq!(again.get(), 8);
        assert_eq!(again.ptr(), first.ptr());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn conditional_site_leaves_sibling_alone() {
        let (_scope, window) = window();
        let (_, sibling) = pass(&window, 2);
        let (none, without) = pass(&window, 0);
        assert!(none.is_empty());
        assert_eq!(without, sibling);
    }

    #[test]
    fn shrinking_loop_keeps_states_by_position() {
        let (_scope, window) = window();
        let (three, _) = pass(&window, 3);
        let (two, _) = pass(&window, 2);
        assert_eq!(two, three[..2]);
        // The third state is still registered; it was only skipped.
        let (back, _) = pass(&window, 3);
        assert_eq!(back, three);
    }

    #[test]
    fn lookup_on_destroyed_window_yields_destroyed_state() {
        let (_scope, window) = window();
        window.destroy();
        let state = window.state_of::<u32>("late");
        assert!(state.is_destroyed());
    }

    proptest! {
        #[test]
        fn auto_identity_is_site_and_occurrence(counts in proptest::collection::vec(0usize..5, 1..8)) {
            let (_scope, window) = window();
            let mut by_occurrence: Vec<Ptr> = Vec::new();
            let mut sibling = None;
            for count in counts {
                let (ptrs, s) = pass(&window, count);
                prop_assert_eq!(*sibling.get_or_insert(s), s);
                for (k, ptr) in ptrs.into_iter().enumerate() {
                    match by_occurrence.get(k) {
                        Some(known) => {
                            prop_assert_eq!(*known, ptr);
                        }
                        None => by_occurrence.push(ptr),
                    }
                }
            }
            prop_assert!(!by_occurrence.contains(&sibling.unwrap_or_default()));
        }
    }
}
