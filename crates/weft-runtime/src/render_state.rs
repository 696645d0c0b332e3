//! Per-component pointer bookkeeping across render passes.
//!
//! Every render pass re-registers the funcs, bound properties and element
//! keys the component still uses. Whatever was not touched by the end of the
//! pass is evicted; evicted funcs are cleared so stale client pointers fail
//! with `NO_SUCH_POINTER` instead of running old closures.
//!
//! Element keys map a component-chosen string to a pointer that stays the
//! same for as long as the key is rendered. The components themselves live
//! in the scope's allocation table, keyed by their pointer, not here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use weft_core::{Ptr, PtrAllocator};

use crate::func::Func;
use crate::state::Property;

/// Counts of entries dropped by [`RenderState::end_pass`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evicted {
    /// Funcs cleared.
    pub funcs: usize,
    /// Property bindings removed.
    pub props: usize,
    /// Element keys released.
    pub elements: usize,
}

/// Pointer tables of one allocated component.
#[derive(Default)]
pub struct RenderState {
    funcs: HashMap<Ptr, Func>,
    props: HashMap<Ptr, Arc<dyn Property>>,
    element_keys: HashMap<String, Ptr>,
    visited: HashSet<Ptr>,
    passes: u64,
}

impl RenderState {
    /// Empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass: nothing is visited yet.
    pub fn begin_pass(&mut self) {
        self.visited.clear();
        self.passes += 1;
    }

    /// Finish a pass, evicting everything not visited since
    /// [`begin_pass`](Self::begin_pass).
    pub fn end_pass(&mut self) -> Evicted {
        let visited = &self.visited;
        let mut evicted = Evicted::default();

        self.funcs.retain(|ptr, func| {
            let keep = visited.contains(ptr);
            if !keep {
                func.clear();
                evicted.funcs += 1;
            }
            keep
        });
        self.props.retain(|ptr, _| {
            let keep = visited.contains(ptr);
            if !keep {
                evicted.props += 1;
            }
            keep
        });
        self.element_keys.retain(|_, ptr| {
            let keep = visited.contains(ptr);
            if !keep {
                evicted.elements += 1;
            }
            keep
        });
        for func in self.funcs.values_mut() {
            func.mark_clean();
        }
        evicted
    }

    /// Register a func for this pass.
    pub fn register_func(&mut self, func: Func) -> Ptr {
        let ptr = func.ptr();
        let _ = self.visited.insert(ptr);
        if let Some(mut previous) = self.funcs.insert(ptr, func) {
            previous.clear();
        }
        ptr
    }

    /// Bind a property for this pass. Re-binding the same state is a no-op
    /// beyond marking it visited.
    pub fn bind(&mut self, prop: Arc<dyn Property>) -> Ptr {
        let ptr = prop.ptr();
        let _ = self.visited.insert(ptr);
        let _ = self.props.entry(ptr).or_insert(prop);
        ptr
    }

    /// Stable pointer for an element key, allocated on first use.
    pub fn element(&mut self, key: &str, ptrs: &PtrAllocator) -> Ptr {
        let ptr = match self.element_keys.get(key) {
            Some(ptr) => *ptr,
            None => {
                let ptr = ptrs.next();
                let _ = self.element_keys.insert(key.to_owned(), ptr);
                ptr
            }
        };
        let _ = self.visited.insert(ptr);
        ptr
    }

    /// Func registered under `ptr`.
    pub fn func_mut(&mut self, ptr: Ptr) -> Option<&mut Func> {
        self.funcs.get_mut(&ptr)
    }

    /// Property bound under `ptr`.
    pub fn prop(&self, ptr: Ptr) -> Option<&Arc<dyn Property>> {
        self.props.get(&ptr)
    }

    /// Clear every func and drop every binding.
    pub fn clear(&mut self) {
        for func in self.funcs.values_mut() {
            func.clear();
        }
        self.funcs.clear();
        self.props.clear();
        self.element_keys.clear();
        self.visited.clear();
    }

    /// Live funcs.
    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    /// Live property bindings.
    pub fn prop_count(&self) -> usize {
        self.props.len()
    }

    /// Live element keys.
    pub fn element_count(&self) -> usize {
        self.element_keys.len()
    }

    /// Completed or running passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn unvisited_funcs_are_evicted_and_cleared() {
        let ptrs = PtrAllocator::new();
        let mut rs = RenderState::new();

        rs.begin_pass();
        let a = rs.register_func(Func::new(ptrs.next(), || {}));
        let b = rs.register_func(Func::new(ptrs.next(), || {}));
        assert_eq!(rs.end_pass(), Evicted::default());

        rs.begin_pass();
        let c = rs.register_func(Func::new(ptrs.next(), || {}));
        let evicted = rs.end_pass();

        assert_eq!(evicted.funcs, 2);
        assert!(rs.func_mut(a).is_none());
        assert!(rs.func_mut(b).is_none());
        assert!(rs.func_mut(c).is_some());
        assert_eq!(rs.passes(), 2);
    }

    #[test]
    fn funcs_are_clean_after_pass() {
        let ptrs = PtrAllocator::new();
        let mut rs = RenderState::new();
        rs.begin_pass();
        let a = rs.register_func(Func::new(ptrs.next(), || {}));
        assert!(rs.func_mut(a).is_some_and(|f| f.is_dirty()));
        let _ = rs.end_pass();
        assert!(rs.func_mut(a).is_some_and(|f| !f.is_dirty()));
    }

    #[test]
    fn element_keys_are_stable_while_visited() {
        let ptrs = PtrAllocator::new();
        let mut rs = RenderState::new();

        rs.begin_pass();
        let first = rs.element("header", &ptrs);
        let _ = rs.end_pass();

        rs.begin_pass();
        assert_eq!(rs.element("header", &ptrs), first);
        let _ = rs.end_pass();

        rs.begin_pass();
        let evicted = rs.end_pass();
        assert_eq!(evicted.elements, 1);

        rs.begin_pass();
        assert_ne!(rs.element("header", &ptrs), first);
    }

    #[test]
    fn bound_props_follow_visits() {
        let ptrs = PtrAllocator::new();
        let clock = Arc::new(AtomicU64::new(1));
        let state = State::new(ptrs.next(), "name", clock, String::new());
        let mut rs = RenderState::new();

        rs.begin_pass();
        let ptr = rs.bind(Arc::new(state.clone()));
        let _ = rs.bind(Arc::new(state));
        let _ = rs.end_pass();
        assert!(rs.prop(ptr).is_some());
        assert_eq!(rs.prop_count(), 1);

        rs.begin_pass();
        assert_eq!(rs.end_pass().props, 1);
        assert!(rs.prop(ptr).is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let ptrs = PtrAllocator::new();
        let mut rs = RenderState::new();
        rs.begin_pass();
        let _ = rs.register_func(Func::new(ptrs.next(), || {}));
        let _ = rs.element("k", &ptrs);
        rs.clear();
        assert_eq!(rs.func_count(), 0);
        assert_eq!(rs.element_count(), 0);
    }
}
