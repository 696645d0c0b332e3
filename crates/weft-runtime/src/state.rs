//! Reactive state cells.
//!
//! A [`State<T>`] is a shared, thread-safe handle to one value owned by a
//! window. Reads and writes are cheap and may happen on any thread; the
//! window's render generation decides whether a state counts as dirty.
//!
//! Generation bookkeeping:
//! - every render pass of the owning window bumps the window generation
//! - looking a state up by id during a pass stamps it with that generation
//! - `set` records the generation current at the time of the write
//! - a state is dirty iff it was written at or after its last lookup
//!
//! Observers only fire for wire-driven mutations (a client assigning the
//! bound property), never for local `set` calls.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use weft_core::Ptr;

use crate::errors::RuntimeError;

/// Values a [`State`] can hold.
pub trait StateValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StateValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Type-erased view of a state, used for pointer binding.
pub trait Property: Send + Sync {
    /// Pointer clients use to assign this property.
    fn ptr(&self) -> Ptr;
    /// Window-local id.
    fn id(&self) -> &str;
    /// Assign from a wire value and notify observers.
    fn parse(&self, value: &Value) -> Result<(), RuntimeError>;
    /// Current value as JSON.
    fn to_value(&self) -> Value;
    /// Generation of the last lookup.
    fn generation(&self) -> u64;
    /// Written since the last lookup.
    fn dirty(&self) -> bool;
    /// Destroy the state. Idempotent.
    fn destroy(&self);
    /// Whether [`destroy`](Self::destroy) has run.
    fn is_destroyed(&self) -> bool;
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;
type DestroyObserver = Box<dyn FnOnce() + Send>;

/// Handle of an observer registration, for [`State::unobserve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverId(u64);

struct Cell<T> {
    value: T,
    generation: u64,
    last_changed: Option<u64>,
    observers: Vec<(ObserverId, Observer<T>)>,
    destroy_observers: Vec<DestroyObserver>,
    next_observer: u64,
    destroyed: bool,
}

struct Inner<T> {
    ptr: Ptr,
    id: String,
    clock: Arc<AtomicU64>,
    cell: Mutex<Cell<T>>,
}

/// Shared handle to a reactive value.
pub struct State<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StateValue> State<T> {
    /// Create a state stamped with the clock's current generation.
    pub(crate) fn new(ptr: Ptr, id: impl Into<String>, clock: Arc<AtomicU64>, value: T) -> Self {
        let generation = clock.load(Ordering::Acquire);
        Self {
            inner: Arc::new(Inner {
                ptr,
                id: id.into(),
                clock,
                cell: Mutex::new(Cell {
                    value,
                    generation,
                    last_changed: None,
                    observers: Vec::new(),
                    destroy_observers: Vec::new(),
                    next_observer: 0,
                    destroyed: false,
                }),
            }),
        }
    }

    /// Pointer bound to this state.
    pub fn ptr(&self) -> Ptr {
        self.inner.ptr
    }

    /// Window-local id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.inner.cell.lock().value.clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.cell.lock().value)
    }

    /// Replace the value. Ignored with a warning once destroyed.
    pub fn set(&self, value: T) {
        let mut cell = self.inner.cell.lock();
        if cell.destroyed {
            warn!(state_id = %self.inner.id, "set on destroyed state ignored");
            return;
        }
        cell.value = value;
        cell.last_changed = Some(self.inner.clock.load(Ordering::Acquire));
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut cell = self.inner.cell.lock();
        if cell.destroyed {
            warn!(state_id = %self.inner.id, "update on destroyed state ignored");
            return;
        }
        f(&mut cell.value);
        cell.last_changed = Some(self.inner.clock.load(Ordering::Acquire));
    }

    /// Register a callback for wire-driven mutations.
    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Result<ObserverId, RuntimeError> {
        let mut cell = self.inner.cell.lock();
        if cell.destroyed {
            return Err(RuntimeError::StateDestroyed(self.inner.id.clone()));
        }
        let id = ObserverId(cell.next_observer);
        cell.next_observer += 1;
        cell.observers.push((id, Arc::new(observer)));
        Ok(id)
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut cell = self.inner.cell.lock();
        let before = cell.observers.len();
        cell.observers.retain(|(oid, _)| *oid != id);
        cell.observers.len() != before
    }

    /// Register a callback fired once when the state is destroyed.
    pub fn on_destroy(&self, observer: impl FnOnce() + Send + 'static) -> Result<(), RuntimeError> {
        let mut cell = self.inner.cell.lock();
        if cell.destroyed {
            return Err(RuntimeError::StateDestroyed(self.inner.id.clone()));
        }
        cell.destroy_observers.push(Box::new(observer));
        Ok(())
    }

    /// Generation at which the value was last written, if ever.
    pub fn last_changed_generation(&self) -> Option<u64> {
        self.inner.cell.lock().last_changed
    }

    /// Stamp with the current render generation.
    pub(crate) fn revalidate(&self) {
        self.inner.cell.lock().generation = self.inner.clock.load(Ordering::Acquire);
    }

    fn assign_and_notify(&self, value: T) -> Result<(), RuntimeError> {
        let observers: Vec<Observer<T>> = {
            let mut cell = self.inner.cell.lock();
            if cell.destroyed {
                return Err(RuntimeError::StateDestroyed(self.inner.id.clone()));
            }
            cell.value = value.clone();
            cell.last_changed = Some(self.inner.clock.load(Ordering::Acquire));
            cell.observers.iter().map(|(_, o)| o.clone()).collect()
        };
        for observer in observers {
            observer(&value);
        }
        Ok(())
    }
}

impl<T: StateValue> Property for State<T> {
    fn ptr(&self) -> Ptr {
        self.inner.ptr
    }

    fn id(&self) -> &str {
        &self.inner.id
    }

    fn parse(&self, value: &Value) -> Result<(), RuntimeError> {
        let parsed: T = serde_json::from_value(value.clone()).map_err(|e| RuntimeError::InvalidValue {
            ptr: self.inner.ptr,
            message: e.to_string(),
        })?;
        self.assign_and_notify(parsed)
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(&self.inner.cell.lock().value).unwrap_or(Value::Null)
    }

    fn generation(&self) -> u64 {
        self.inner.cell.lock().generation
    }

    fn dirty(&self) -> bool {
        let cell = self.inner.cell.lock();
        cell.last_changed.is_some_and(|changed| changed >= cell.generation)
    }

    fn destroy(&self) {
        let observers = {
            let mut cell = self.inner.cell.lock();
            if cell.destroyed {
                return;
            }
            cell.destroyed = true;
            cell.observers.clear();
            std::mem::take(&mut cell.destroy_observers)
        };
        for observer in observers {
            observer();
        }
    }

    fn is_destroyed(&self) -> bool {
        self.inner.cell.lock().destroyed
    }
}

impl<T: StateValue + fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.cell.lock();
        f.debug_struct("State")
            .field("ptr", &self.inner.ptr)
            .field("id", &self.inner.id)
            .field("value", &cell.value)
            .field("generation", &cell.generation)
            .field("destroyed", &cell.destroyed)
            .finish()
    }
}
