//! Loop-owned scope state and client event dispatch.
//!
//! Everything here runs on the scope's loop thread. The allocated component
//! table is reachable from nowhere else.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, debug_span, error, info, trace, warn};
use weft_core::logging::{panic_message, take_panic_backtrace};
use weft_core::{Ptr, RequestId};
use weft_protocol::{ClientEvent, RenderTree, ServerEvent, WindowInfo};

use crate::component::{Component, Factories, NOT_FOUND_FACTORY, NewComponentRequest, RenderContext};
use crate::errors::RuntimeError;
use crate::locale::{negotiate_locale, parse_timezone};
use crate::render_state::RenderState;
use crate::scope::ScopeCore;
use crate::window::Window;

struct Allocated {
    factory: String,
    component: Box<dyn Component>,
    window: Window,
    render_state: RenderState,
}

impl Allocated {
    fn render(&mut self) -> Result<RenderTree, RuntimeError> {
        let Self {
            component,
            window,
            render_state,
            ..
        } = self;
        window.begin_pass();
        render_state.begin_pass();
        let result = guarded(|| {
            let mut ctx = RenderContext::new(window, render_state);
            component.render(&mut ctx)
        });
        let evicted = render_state.end_pass();
        window.end_pass();
        trace!(
            component = %window.component(),
            generation = window.generation(),
            evicted_funcs = evicted.funcs,
            evicted_props = evicted.props,
            "render pass finished"
        );
        result
    }

    fn teardown(&mut self) {
        if let Err(e) = guarded(|| self.component.destroy()) {
            error!(component = %self.window.component(), error = %e, "component destroy hook failed");
        }
        self.render_state.clear();
        self.window.destroy();
    }
}

/// Run `f`, turning a panic into [`RuntimeError::Panicked`]. The stack of
/// the panic is logged here since the error only carries the message.
fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, RuntimeError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        if let Some(backtrace) = take_panic_backtrace() {
            error!(panic = %message, %backtrace, "component code panicked");
        }
        RuntimeError::Panicked(message)
    })
}

/// State of a scope owned by its loop worker.
pub(crate) struct ScopeState {
    core: Arc<ScopeCore>,
    factories: Arc<Factories>,
    allocated: BTreeMap<Ptr, Allocated>,
}

impl ScopeState {
    pub(crate) fn new(core: Arc<ScopeCore>, factories: Arc<Factories>) -> Self {
        Self {
            core,
            factories,
            allocated: BTreeMap::new(),
        }
    }

    /// Handle one top-level client event.
    pub(crate) fn handle(&mut self, event: ClientEvent) {
        let request_id = event.request_id();
        let _span = debug_span!("event", scope_id = %self.core.id, kind = event.kind(), %request_id).entered();
        let aggregated = matches!(event, ClientEvent::Aggregated { .. });

        self.dispatch(event);
        if self.core.is_destroyed() {
            return;
        }
        self.render_invalidated(request_id);
        if aggregated {
            self.acknowledge(request_id);
        }
    }

    fn dispatch(&mut self, event: ClientEvent) {
        counter!("scope_events_total", "kind" => event.kind()).increment(1);
        let request_id = event.request_id();
        let result = match event {
            ClientEvent::Aggregated { events, .. } => {
                for inner in events {
                    self.dispatch(inner);
                }
                Ok(())
            }
            ClientEvent::SetPropertyValue { ptr, value, .. } => self.set_property(ptr, &value),
            ClientEvent::FunctionCallRequested { ptr, .. } => self.call_function(ptr),
            ClientEvent::NewComponentRequested { factory, values, .. } => {
                self.allocate(request_id, factory, values)
            }
            ClientEvent::ComponentInvalidationRequested { ptr, .. } => self.render(ptr, request_id),
            ClientEvent::ComponentDestructionRequested { ptr, .. } => self
                .destroy_component(ptr)
                .map(|()| self.acknowledge(request_id)),
            ClientEvent::ScopeDestructionRequested { .. } => {
                self.acknowledge(request_id);
                self.core.destroy();
                Ok(())
            }
            ClientEvent::ConfigurationRequested {
                accept_language,
                timezone,
                window_info,
                ..
            } => {
                self.configure(request_id, &accept_language, &timezone, window_info);
                Ok(())
            }
            ClientEvent::WindowInfoChanged { info } => {
                self.core.session.write().window_info = info;
                self.invalidate_all();
                Ok(())
            }
            ClientEvent::CallResolved { ptr, ret } => self.resolve_call(ptr, ret),
            ClientEvent::Ping => Ok(()),
            ClientEvent::Unknown => {
                warn!(scope_id = %self.core.id, "unknown event type ignored");
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!(
                scope_id = %self.core.id,
                %request_id,
                code = err.code(),
                error = %err,
                "event failed"
            );
            self.core.publish(&err.to_event(request_id));
        }
    }

    fn acknowledge(&self, request_id: RequestId) {
        self.core.publish(&ServerEvent::Acknowledged { request_id });
    }

    // ── pointers ────────────────────────────────────────────────────

    fn set_property(&mut self, ptr: Ptr, value: &Value) -> Result<(), RuntimeError> {
        let (prop, window) = self
            .allocated
            .values()
            .find_map(|a| a.render_state.prop(ptr).map(|p| (p.clone(), a.window.clone())))
            .ok_or(RuntimeError::NoSuchPointer(ptr))?;
        guarded(|| prop.parse(value))??;
        window.invalidate();
        Ok(())
    }

    fn call_function(&mut self, ptr: Ptr) -> Result<(), RuntimeError> {
        for alloc in self.allocated.values_mut() {
            if let Some(func) = alloc.render_state.func_mut(ptr) {
                guarded(|| func.invoke())??;
                alloc.window.invalidate();
                return Ok(());
            }
        }
        Err(RuntimeError::NoSuchPointer(ptr))
    }

    fn resolve_call(&mut self, ptr: Ptr, ret: Value) -> Result<(), RuntimeError> {
        let pending = self
            .allocated
            .values()
            .find_map(|a| a.window.take_call(ptr).map(|cb| (cb, a.window.clone())));
        match pending {
            Some((callback, window)) => {
                guarded(|| callback(ret))?;
                window.invalidate();
            }
            None => debug!(scope_id = %self.core.id, %ptr, "answer to unknown or stale call ignored"),
        }
        Ok(())
    }

    // ── components ──────────────────────────────────────────────────

    fn allocate(
        &mut self,
        request_id: RequestId,
        factory_id: String,
        values: BTreeMap<String, String>,
    ) -> Result<(), RuntimeError> {
        let factory = match self.factories.get(&factory_id) {
            Some(factory) => factory.clone(),
            None => {
                let fallback = self
                    .factories
                    .get(NOT_FOUND_FACTORY)
                    .cloned()
                    .ok_or_else(|| RuntimeError::NoSuchFactory(factory_id.clone()))?;
                debug!(factory = %factory_id, "unknown factory, using not-found fallback");
                fallback
            }
        };

        let ptr = self.core.ptrs.next();
        let window = Window::new(self.core.clone(), ptr, factory_id.clone(), values.clone());
        let request = NewComponentRequest {
            request_id,
            factory: factory_id.clone(),
            values,
        };
        let component = match guarded(|| factory(&window, &request)) {
            Ok(Some(component)) => component,
            Ok(None) => {
                window.destroy();
                return Err(RuntimeError::FactoryFailed(factory_id));
            }
            Err(e) => {
                window.destroy();
                return Err(e);
            }
        };

        counter!("components_allocated_total").increment(1);
        info!(scope_id = %self.core.id, component = %ptr, factory = %factory_id, "component allocated");
        let _ = self.allocated.insert(
            ptr,
            Allocated {
                factory: factory_id,
                component,
                window,
                render_state: RenderState::new(),
            },
        );
        self.render(ptr, request_id)
    }

    fn render(&mut self, ptr: Ptr, request_id: RequestId) -> Result<(), RuntimeError> {
        let alloc = self
            .allocated
            .get_mut(&ptr)
            .ok_or(RuntimeError::NoSuchComponent(ptr))?;
        let tree = alloc.render()?;
        self.core
            .publish(&ServerEvent::ComponentInvalidated { request_id, ptr, tree });
        Ok(())
    }

    /// Render every component whose window was invalidated.
    pub(crate) fn render_invalidated(&mut self, request_id: RequestId) {
        let _ = self.core.take_render_request();
        if self.core.take_full_render_request() {
            self.invalidate_all();
        }
        let pending: Vec<Ptr> = self
            .allocated
            .iter()
            .filter(|(_, a)| a.window.is_invalidated())
            .map(|(ptr, _)| *ptr)
            .collect();
        for ptr in pending {
            if let Err(err) = self.render(ptr, request_id) {
                warn!(scope_id = %self.core.id, component = %ptr, error = %err, "render failed");
                self.core.publish(&err.to_event(request_id));
            }
        }
    }

    fn invalidate_all(&self) {
        for alloc in self.allocated.values() {
            alloc.window.invalidate();
        }
    }

    fn destroy_component(&mut self, ptr: Ptr) -> Result<(), RuntimeError> {
        let mut alloc = self
            .allocated
            .remove(&ptr)
            .ok_or(RuntimeError::NoSuchComponent(ptr))?;
        alloc.teardown();
        info!(scope_id = %self.core.id, component = %ptr, factory = %alloc.factory, "component destroyed");
        Ok(())
    }

    // ── session ─────────────────────────────────────────────────────

    fn configure(
        &mut self,
        request_id: RequestId,
        accept_language: &str,
        timezone: &str,
        window_info: Option<WindowInfo>,
    ) {
        let app = &self.core.application;
        let locale = negotiate_locale(accept_language, &app.locales, &app.default_locale);
        let tz = parse_timezone(timezone);
        {
            let mut session = self.core.session.write();
            session.locale.clone_from(&locale);
            session.timezone = tz;
            if let Some(info) = window_info {
                session.window_info = info;
            }
        }
        debug!(scope_id = %self.core.id, %locale, timezone = tz.name(), "configuration negotiated");
        self.core.publish(&ServerEvent::ConfigurationDefined {
            request_id,
            application_name: app.name.clone(),
            locale,
            locales: app.locales.clone(),
            themes: app.themes.clone(),
            timezone: tz.name().to_owned(),
        });
        self.invalidate_all();
    }
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        let components = self.allocated.len();
        for (_, mut alloc) in std::mem::take(&mut self.allocated) {
            alloc.teardown();
        }
        debug!(scope_id = %self.core.id, components, "scope state torn down");
    }
}
