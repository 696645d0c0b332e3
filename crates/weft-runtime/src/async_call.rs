//! Pending server-initiated calls awaiting `CallResolved`.
//!
//! A render pass drops the calls issued before the previous pass, not every
//! call outstanding when it starts. `function.call` is followed by an
//! automatic re-render of the calling component, so a call issued from a
//! callback would otherwise be forgotten before the client could answer.
//! An answer to a call two or more passes old is ignored.

use std::collections::HashMap;

use serde_json::Value;
use weft_core::Ptr;

/// Callback run with the client's answer.
pub(crate) type CallCallback = Box<dyn FnOnce(Value) + Send + 'static>;

struct PendingCall {
    generation: u64,
    callback: CallCallback,
}

/// Calls of one window, keyed by correlation pointer and tagged with the
/// render generation they were issued in.
#[derive(Default)]
pub(crate) struct PendingCalls {
    entries: HashMap<Ptr, PendingCall>,
}

impl PendingCalls {
    pub(crate) fn insert(&mut self, ptr: Ptr, generation: u64, callback: CallCallback) {
        let _ = self.entries.insert(ptr, PendingCall { generation, callback });
    }

    pub(crate) fn take(&mut self, ptr: Ptr) -> Option<CallCallback> {
        self.entries.remove(&ptr).map(|call| call.callback)
    }

    pub(crate) fn cancel(&mut self, ptr: Ptr) -> bool {
        self.entries.remove(&ptr).is_some()
    }

    /// Drop calls issued before `generation`. The window passes the
    /// generation of the previous pass. Returns how many were dropped.
    pub(crate) fn evict_older_than(&mut self, generation: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, call| call.generation >= generation);
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn take_returns_callback_once() {
        let mut calls = PendingCalls::default();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        calls.insert(Ptr::from_raw(4), 1, Box::new(move |_| f.store(true, Ordering::SeqCst)));

        let cb = calls.take(Ptr::from_raw(4)).unwrap();
        cb(Value::Null);
        assert!(fired.load(Ordering::SeqCst));
        assert!(calls.take(Ptr::from_raw(4)).is_none());
    }

    #[test]
    fn eviction_keeps_current_and_previous_generation() {
        let mut calls = PendingCalls::default();
        calls.insert(Ptr::from_raw(1), 1, Box::new(|_| {}));
        calls.insert(Ptr::from_raw(2), 2, Box::new(|_| {}));
        calls.insert(Ptr::from_raw(3), 3, Box::new(|_| {}));

        assert_eq!(calls.evict_older_than(2), 1);
        assert_eq!(calls.len(), 2);
        assert!(calls.take(Ptr::from_raw(1)).is_none());
    }

    #[test]
    fn cancel_and_clear() {
        let mut calls = PendingCalls::default();
        calls.insert(Ptr::from_raw(1), 0, Box::new(|_| {}));
        calls.insert(Ptr::from_raw(2), 0, Box::new(|_| {}));
        assert!(calls.cancel(Ptr::from_raw(1)));
        assert!(!calls.cancel(Ptr::from_raw(1)));
        calls.clear();
        assert_eq!(calls.len(), 0);
    }
}
