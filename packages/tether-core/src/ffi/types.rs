//! # FFI Types
//!
//! C-compatible types shared with the native library.
//!
//! Every struct here is `#[repr(C)]` with fields in declared order; the
//! native side reads and writes them directly.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::slice;

use super::status::CallStatus;
use crate::error::{Error, Result};

/// A buffer allocated and owned by the native side
///
/// The host never deallocates one directly. It copies the bytes out and
/// hands the buffer back through the `rustbuffer_free` entry point, exactly
/// once. See [`NativeBuffer`](super::buffer::NativeBuffer) for the guard that
/// enforces this.
#[repr(C)]
#[derive(Debug)]
pub struct OwnedBuffer {
    /// Allocated capacity in bytes
    pub capacity: u64,
    /// Number of initialized bytes
    pub len: u64,
    /// Start of the allocation (may be null when empty)
    pub data: *mut u8,
}

// The buffer is only a token for native memory; moving it between threads
// does not touch the allocation.
unsafe impl Send for OwnedBuffer {}

impl OwnedBuffer {
    /// The empty buffer (null data, zero length)
    pub const fn empty() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: std::ptr::null_mut(),
        }
    }

    /// Whether the buffer carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0 || self.data.is_null()
    }

    /// Number of bytes carried
    pub fn len(&self) -> usize {
        if self.data.is_null() {
            0
        } else {
            self.len as usize
        }
    }

    /// Whether there is a native allocation behind this buffer
    pub(crate) fn is_allocated(&self) -> bool {
        !self.data.is_null()
    }

    /// View the buffer contents.
    ///
    /// # Safety
    ///
    /// `data` must point to at least `len` initialized bytes that stay
    /// valid for the returned lifetime, i.e. the buffer has not been freed.
    pub(crate) unsafe fn as_slice(&self) -> &[u8] {
        if self.is_empty() {
            &[]
        } else {
            slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

impl Default for OwnedBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

/// A borrowed view of host bytes handed to the native side for one call
///
/// The lifetime ties the view to the host slice, so the bytes cannot move
/// or be dropped while the native side is reading them.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignBytes<'a> {
    /// Number of bytes
    pub len: i32,
    /// Start of the host slice
    pub data: *const u8,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> ForeignBytes<'a> {
    /// Borrow a host slice. Fails if it is longer than `i32::MAX`.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let len = i32::try_from(bytes.len()).map_err(|_| {
            Error::Encode(format!(
                "{} bytes exceeds the foreign bytes limit of {}",
                bytes.len(),
                i32::MAX
            ))
        })?;
        Ok(Self {
            len,
            data: bytes.as_ptr(),
            _borrow: PhantomData,
        })
    }

    /// View the borrowed bytes again (native-side helper, used by mocks)
    ///
    /// # Safety
    ///
    /// The view must have been built by [`ForeignBytes::new`] or by a
    /// caller upholding the same contract.
    pub unsafe fn as_slice(&self) -> &'a [u8] {
        if self.len <= 0 || self.data.is_null() {
            &[]
        } else {
            slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

// ============================================================================
// ENTRY POINT SIGNATURES
// ============================================================================

/// `<ffi_ns>_rustbuffer_from_bytes`
pub type BufferFromBytesFn =
    unsafe extern "C" fn(bytes: ForeignBytes<'_>, status: *mut CallStatus) -> OwnedBuffer;

/// `<ffi_ns>_rustbuffer_free`
pub type BufferFreeFn = unsafe extern "C" fn(buffer: OwnedBuffer, status: *mut CallStatus);

/// `<ns>_fn_clone_<type>`
pub type ObjectCloneFn =
    unsafe extern "C" fn(ptr: *mut c_void, status: *mut CallStatus) -> *mut c_void;

/// `<ns>_fn_free_<type>`
pub type ObjectFreeFn = unsafe extern "C" fn(ptr: *mut c_void, status: *mut CallStatus);
