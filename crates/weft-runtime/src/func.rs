//! Callback records addressed by pointer.

use weft_core::Ptr;

use crate::errors::RuntimeError;

/// A callback registered during a render pass.
///
/// Funcs are owned by the render state of one component and only touched on
/// the scope's loop thread, so the closure need not be `Send`.
pub struct Func {
    ptr: Ptr,
    callback: Option<Box<dyn FnMut()>>,
    dirty: bool,
}

impl Func {
    /// Wrap a callback under `ptr`.
    pub fn new(ptr: Ptr, callback: impl FnMut() + 'static) -> Self {
        Self {
            ptr,
            callback: Some(Box::new(callback)),
            dirty: true,
        }
    }

    /// Pointer the client uses to call this func; [`Ptr::NULL`] once cleared.
    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// Run the callback.
    pub fn invoke(&mut self) -> Result<(), RuntimeError> {
        match self.callback.as_mut() {
            Some(callback) => {
                callback();
                Ok(())
            }
            None => Err(RuntimeError::NoSuchPointer(self.ptr)),
        }
    }

    /// Drop the callback and zero the pointer. Idempotent.
    pub fn clear(&mut self) {
        self.ptr = Ptr::NULL;
        self.callback = None;
        self.dirty = false;
    }

    /// Whether [`clear`](Self::clear) was called.
    pub fn is_cleared(&self) -> bool {
        self.callback.is_none()
    }

    /// Registered in the current pass and not yet published.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Func")
            .field("ptr", &self.ptr)
            .field("cleared", &self.is_cleared())
            .field("dirty", &self.dirty)
            .finish()
    }
}
