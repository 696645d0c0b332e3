//! # weft-runtime
//!
//! Server-driven UI session runtime.
//!
//! A [`Scope`] is one client session. It owns a single-threaded
//! [`EventLoop`] on which all of its components render and all client events
//! are dispatched, so component code never needs locks around its own state.
//! Transports plug in through the [`Channel`] trait; [`Scopes`] keeps the
//! live scopes, resumes them on reconnect and expires idle ones.
//!
//! ## Modules
//!
//! - [`event_loop`]: single-worker task queue with hand-off backpressure
//! - [`scope`] / [`scopes`]: session lifecycle and registry
//! - [`component`]: components, factories and the render context
//! - [`window`]: per-component services (state, navigation, client calls)
//! - [`state`]: reactive state cells
//! - [`channel`]: transport seam and the in-process [`MemoryChannel`]

#![deny(unsafe_code)]

mod async_call;
pub mod channel;
pub mod component;
mod dispatch;
pub mod errors;
pub mod event_loop;
pub mod func;
pub mod locale;
pub mod navigation;
pub mod render_state;
pub mod scope;
pub mod scopes;
pub mod state;
pub mod subject;
pub mod window;

pub use channel::{Channel, ChannelError, MemoryChannel, MessageHandler, Subscription};
pub use component::{
    Component, ComponentFactory, Factories, NOT_FOUND_FACTORY, NewComponentRequest, RenderContext, component,
};
pub use errors::RuntimeError;
pub use event_loop::EventLoop;
pub use navigation::Navigation;
pub use scope::Scope;
pub use scopes::Scopes;
pub use state::{ObserverId, Property, State, StateValue};
pub use subject::{Anonymous, AnonymousProvider, StaticSubject, Subject, SubjectProvider};
pub use window::{CancelHandle, ImportOptions, Window};
