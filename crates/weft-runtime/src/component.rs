//! Components, their factories and the render context.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use weft_core::{Ptr, RequestId};
use weft_protocol::RenderTree;

use crate::func::Func;
use crate::render_state::RenderState;
use crate::state::{State, StateValue};
use crate::window::Window;

/// Factory id used when a requested factory is not registered.
pub const NOT_FOUND_FACTORY: &str = "_";

/// A renderable unit of UI.
///
/// Components live on their scope's loop thread for their whole life and
/// need not be `Send`.
pub trait Component {
    /// Produce the current render tree.
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> RenderTree;

    /// Release resources. Called once, on the loop thread.
    fn destroy(&mut self) {}
}

struct FnComponent<F>(F);

impl<F> Component for FnComponent<F>
where
    F: FnMut(&mut RenderContext<'_>) -> RenderTree,
{
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> RenderTree {
        (self.0)(ctx)
    }
}

/// Box a render closure as a component.
pub fn component<F>(render: F) -> Box<dyn Component>
where
    F: FnMut(&mut RenderContext<'_>) -> RenderTree + 'static,
{
    Box::new(FnComponent(render))
}

/// What a client asked a factory to build.
#[derive(Clone, Debug, Default)]
pub struct NewComponentRequest {
    /// Correlation id of the request.
    pub request_id: RequestId,
    /// Factory id as requested, even when the fallback serves it.
    pub factory: String,
    /// Navigation values.
    pub values: BTreeMap<String, String>,
}

/// Builds a component for a window. `None` reports `FACTORY_FAILED`.
pub type ComponentFactory =
    Arc<dyn Fn(&Window, &NewComponentRequest) -> Option<Box<dyn Component>> + Send + Sync>;

/// Registered factories by id.
#[derive(Clone, Default)]
pub struct Factories {
    factories: HashMap<String, ComponentFactory>,
}

impl Factories {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `id`, replacing any previous one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Window, &NewComponentRequest) -> Option<Box<dyn Component>> + Send + Sync + 'static,
    {
        let _ = self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Window, &NewComponentRequest) -> Option<Box<dyn Component>> + Send + Sync + 'static,
    {
        let _ = self.register(id, factory);
        self
    }

    /// Factory registered under `id`.
    pub fn get(&self, id: &str) -> Option<&ComponentFactory> {
        self.factories.get(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factories").field("ids", &self.ids()).finish()
    }
}

/// Handed to [`Component::render`]: registers pointers for this pass.
pub struct RenderContext<'a> {
    window: &'a Window,
    render_state: &'a mut RenderState,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(window: &'a Window, render_state: &'a mut RenderState) -> Self {
        Self { window, render_state }
    }

    /// The component's window.
    pub fn window(&self) -> &Window {
        self.window
    }

    /// Register a callback; the pointer is fresh every pass.
    pub fn func(&mut self, callback: impl FnMut() + 'static) -> Ptr {
        let ptr = self.window.ptrs().next();
        self.render_state.register_func(Func::new(ptr, callback))
    }

    /// Bind `state` as a client-assignable property. Binding counts as a use
    /// of the state in this pass.
    pub fn bind<T: StateValue>(&mut self, state: &State<T>) -> Ptr {
        state.revalidate();
        self.render_state.bind(Arc::new(state.clone()))
    }

    /// Stable pointer for an element key.
    pub fn element(&mut self, key: &str) -> Ptr {
        self.render_state.element(key, self.window.ptrs())
    }

    /// See [`Window::state_of`].
    pub fn state_of<T: StateValue + Default>(&self, id: &str) -> State<T> {
        self.window.state_of(id)
    }

    /// See [`Window::auto_state`].
    #[track_caller]
    pub fn auto_state<T: StateValue + Default>(&self) -> State<T> {
        self.window.auto_state()
    }
}
