//! # Handle Lifecycle
//!
//! Host-side ownership of reference-counted native objects.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HANDLE LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  constructor ──► Handle::wrap ──► Live ──────── dispose() ──► Disposed │
//! │                                    │                 (free, once)       │
//! │                                    │                                    │
//! │                                    ├── for_call() ──► CallPointer       │
//! │                                    │     (clone)        │               │
//! │                                    │                    ├─ into_raw() ──► native call
//! │                                    │                    ├─ Writer::write_handle
//! │                                    │                    └─ dropped ──► free
//! │                                    │                                    │
//! │                                    └── duplicate() ──► second Handle    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Handle` holds exactly one native reference. Native calls consume the
//! reference they are given, so every call receives a fresh clone and the
//! handle stays valid for the next one.

use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use super::buffer::BufferVTable;
use super::status::CallStatus;
use super::types::{ObjectCloneFn, ObjectFreeFn};
use crate::error::{Error, Result};

/// Clone/free entry points for one native object type
#[derive(Clone, Copy)]
pub struct HandleVTable {
    /// Native type name, used in errors and logs
    pub type_name: &'static str,
    clone: ObjectCloneFn,
    free: ObjectFreeFn,
    buffers: BufferVTable,
}

impl HandleVTable {
    /// Build a vtable from resolved entry points.
    ///
    /// # Safety
    ///
    /// `clone` and `free` must be the `<ns>_fn_clone_<type>` and
    /// `<ns>_fn_free_<type>` functions of one type, and `buffers` must
    /// belong to the same library.
    pub unsafe fn new(
        type_name: &'static str,
        clone: ObjectCloneFn,
        free: ObjectFreeFn,
        buffers: BufferVTable,
    ) -> Self {
        Self {
            type_name,
            clone,
            free,
            buffers,
        }
    }

    fn release(&self, ptr: NonNull<c_void>) {
        let mut status = CallStatus::new();
        // SAFETY: `ptr` carries one reference owned by the caller.
        unsafe { (self.free)(ptr.as_ptr(), &mut status) };

        if let Err(e) = status.check(&self.buffers, None) {
            tracing::error!(
                type_name = self.type_name,
                error = %e,
                "native free failed"
            );
        }
    }
}

impl fmt::Debug for HandleVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleVTable")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// One owned reference to a native object
pub struct Handle {
    ptr: Option<NonNull<c_void>>,
    vtable: HandleVTable,
}

// Native objects behind a handle are reference counted with atomic
// operations on the native side.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// Take ownership of one reference returned by a native call.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live object of the vtable's type, and the caller
    /// transfers exactly one reference to the returned handle.
    pub unsafe fn wrap(ptr: *mut c_void, vtable: HandleVTable) -> Result<Self> {
        let ptr = NonNull::new(ptr).ok_or(Error::NullHandle {
            type_name: vtable.type_name,
        })?;
        Ok(Self {
            ptr: Some(ptr),
            vtable,
        })
    }

    /// Take ownership of a reference that arrived as a pointer-sized integer
    /// inside a codec buffer.
    ///
    /// # Safety
    ///
    /// Same contract as [`Handle::wrap`].
    pub unsafe fn from_raw_u64(value: u64, vtable: HandleVTable) -> Result<Self> {
        Self::wrap(value as usize as *mut c_void, vtable)
    }

    /// Native type name
    pub fn type_name(&self) -> &'static str {
        self.vtable.type_name
    }

    /// Whether `dispose` has already released this handle
    pub fn is_disposed(&self) -> bool {
        self.ptr.is_none()
    }

    /// Clone the native reference for one call
    ///
    /// Fails with [`Error::Disposed`] without touching the native side if
    /// the handle was disposed.
    pub fn for_call(&self) -> Result<CallPointer> {
        let ptr = self.ptr.ok_or(Error::Disposed {
            type_name: self.vtable.type_name,
        })?;

        let mut status = CallStatus::new();
        // SAFETY: `ptr` is live while the handle holds its reference.
        let cloned = unsafe { (self.vtable.clone)(ptr.as_ptr(), &mut status) };
        status.check(&self.vtable.buffers, None)?;

        let cloned = NonNull::new(cloned).ok_or(Error::NullHandle {
            type_name: self.vtable.type_name,
        })?;

        Ok(CallPointer {
            ptr: cloned,
            vtable: self.vtable,
        })
    }

    /// A second independent handle to the same native object
    pub fn duplicate(&self) -> Result<Handle> {
        let pointer = self.for_call()?;
        let vtable = pointer.vtable;
        let ptr = pointer.into_non_null();
        Ok(Handle {
            ptr: Some(ptr),
            vtable,
        })
    }

    /// Release the native reference. Calling this again does nothing.
    pub fn dispose(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            tracing::trace!(type_name = self.vtable.type_name, "disposing handle");
            self.vtable.release(ptr);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            tracing::trace!(
                type_name = self.vtable.type_name,
                "handle released on drop"
            );
            self.vtable.release(ptr);
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type_name", &self.vtable.type_name)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// ============================================================================
// CALL POINTER
// ============================================================================

/// A freshly cloned reference, ready to be consumed by one native call
///
/// Only [`Handle::for_call`] creates these. Dropping one without passing it
/// to the native side releases the reference.
#[must_use = "a call pointer releases its reference when dropped unused"]
pub struct CallPointer {
    ptr: NonNull<c_void>,
    vtable: HandleVTable,
}

unsafe impl Send for CallPointer {}

impl CallPointer {
    /// Native type name
    pub fn type_name(&self) -> &'static str {
        self.vtable.type_name
    }

    /// The pointer value, without giving up the reference
    pub(crate) fn as_u64(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    /// Hand the reference to a native call that consumes it
    pub fn into_raw(self) -> *mut c_void {
        self.into_non_null().as_ptr()
    }

    /// Hand the reference over as a pointer-sized integer
    pub fn into_u64(self) -> u64 {
        self.into_raw() as usize as u64
    }

    fn into_non_null(self) -> NonNull<c_void> {
        let this = ManuallyDrop::new(self);
        this.ptr
    }
}

impl Drop for CallPointer {
    fn drop(&mut self) {
        tracing::trace!(
            type_name = self.vtable.type_name,
            "unused call pointer released"
        );
        self.vtable.release(self.ptr);
    }
}

impl fmt::Debug for CallPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPointer")
            .field("type_name", &self.vtable.type_name)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
