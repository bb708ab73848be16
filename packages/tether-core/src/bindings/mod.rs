//! # Typed Bindings
//!
//! Host types over the native library's objects. Each wrapper is a
//! [`Handle`](crate::ffi::Handle) plus the [`Bridge`] it was created from.
//!
//! ## Patterns
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WRAPPER PATTERNS                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SecretKey / PublicKey   synchronous constructors and methods          │
//! │  Wallet                  constructed from another handle               │
//! │  PaymentOption           enum variant embedding a handle               │
//! │  UploadReceipt           record decoded from a result buffer           │
//! │  Client                  async constructor and methods, all four       │
//! │                          future result shapes                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry point and vtable a call needs is resolved before any
//! argument is lowered, so a missing symbol never strands a buffer or a
//! cloned reference.

mod client;
mod keys;
mod wallet;

pub use client::{Client, UploadReceipt, CLIENT_ERROR};
pub use keys::{PublicKey, SecretKey, KEY_ERROR};
pub use wallet::{PaymentOption, Wallet, WALLET_ERROR};

use std::ffi::c_void;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::ffi::{BufferFormat, CallStatus, FutureHandle, OwnedBuffer};

// ============================================================================
// ENTRY POINT SIGNATURES
// ============================================================================

/// `fn(status) -> object`
pub(crate) type NewObjectFn = unsafe extern "C" fn(status: *mut CallStatus) -> *mut c_void;

/// `fn(buffer, status) -> object`
pub(crate) type BufferToObjectFn =
    unsafe extern "C" fn(arg: OwnedBuffer, status: *mut CallStatus) -> *mut c_void;

/// `fn(object, status) -> object`
pub(crate) type ObjectToObjectFn =
    unsafe extern "C" fn(this: *mut c_void, status: *mut CallStatus) -> *mut c_void;

/// `fn(object, status) -> buffer`
pub(crate) type ObjectToBufferFn =
    unsafe extern "C" fn(this: *mut c_void, status: *mut CallStatus) -> OwnedBuffer;

/// `fn(status) -> buffer`
pub(crate) type BufferResultFn = unsafe extern "C" fn(status: *mut CallStatus) -> OwnedBuffer;

/// `fn(object) -> future`
pub(crate) type ObjectAsyncFn = unsafe extern "C" fn(this: *mut c_void) -> FutureHandle;

/// `fn(object, buffer) -> future`
pub(crate) type ObjectBufferAsyncFn =
    unsafe extern "C" fn(this: *mut c_void, arg: OwnedBuffer) -> FutureHandle;

// ============================================================================
// RESOLUTION HELPERS
// ============================================================================

/// Resolve `<ns>_fn_constructor_<type>_<member>`.
///
/// # Safety
///
/// `F` must match the constructor's C signature.
pub(crate) unsafe fn constructor<F: Copy>(
    bridge: &Bridge,
    type_name: &str,
    member: &str,
) -> Result<F> {
    bridge.resolve(&bridge.names().constructor(type_name, member))
}

/// Resolve `<ns>_fn_method_<type>_<member>`.
///
/// # Safety
///
/// `F` must match the method's C signature.
pub(crate) unsafe fn method<F: Copy>(
    bridge: &Bridge,
    type_name: &str,
    member: &str,
) -> Result<F> {
    bridge.resolve(&bridge.names().method(type_name, member))
}

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

/// Version string reported by the loaded native library
pub fn native_version(bridge: &Bridge) -> Result<String> {
    // SAFETY: `version` takes only a status and returns a raw UTF-8 buffer.
    let version: BufferResultFn = unsafe { bridge.resolve(&bridge.names().function("version"))? };
    bridge
        .call_buffer(None, |status| unsafe { version(status) })?
        .into_string(BufferFormat::Raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AsyncStrategy;
    use crate::testing;

    #[test]
    fn test_native_version() {
        let bridge = testing::bridge(AsyncStrategy::default());
        assert_eq!(native_version(&bridge).unwrap(), testing::NATIVE_VERSION);
    }
}
