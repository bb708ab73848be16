//! Secret and public keys.
//!
//! The simplest wrapper pattern: synchronous constructors and methods, raw
//! UTF-8 hex strings in both directions, and a structured error enum.

use std::fmt;

use super::{
    constructor, method, BufferToObjectFn, NewObjectFn, ObjectToBufferFn, ObjectToObjectFn,
};
use crate::bridge::Bridge;
use crate::error::Result;
use crate::ffi::{BufferFormat, ErrorSchema, Handle};

/// Errors raised by key constructors
pub const KEY_ERROR: ErrorSchema = ErrorSchema::new("KeyError", &["InvalidHex", "InvalidLength"]);

// ============================================================================
// SECRET KEY
// ============================================================================

/// A native secret key
pub struct SecretKey {
    handle: Handle,
    bridge: Bridge,
}

impl SecretKey {
    pub(crate) const TYPE_NAME: &'static str = "secretkey";

    /// Generate a fresh random key
    pub fn random(bridge: &Bridge) -> Result<Self> {
        let vtable = bridge.handle_vtable(Self::TYPE_NAME)?;
        // SAFETY: `random` takes only a status and returns a new key.
        let random: NewObjectFn = unsafe { constructor(bridge, Self::TYPE_NAME, "random")? };

        let handle = bridge.call_object(vtable, None, |status| unsafe { random(status) })?;
        Ok(Self {
            handle,
            bridge: bridge.clone(),
        })
    }

    /// Parse a key from its hex encoding
    ///
    /// Fails with a `KeyError` native error if the string is not hex or not
    /// 32 bytes long.
    pub fn from_hex(bridge: &Bridge, hex: &str) -> Result<Self> {
        let vtable = bridge.handle_vtable(Self::TYPE_NAME)?;
        // SAFETY: `from_hex` consumes one raw UTF-8 buffer.
        let from_hex: BufferToObjectFn =
            unsafe { constructor(bridge, Self::TYPE_NAME, "from_hex")? };

        let arg = bridge.buffers().lower_str(hex)?;
        let handle = bridge.call_object(vtable, Some(&KEY_ERROR), |status| unsafe {
            from_hex(arg, status)
        })?;
        Ok(Self {
            handle,
            bridge: bridge.clone(),
        })
    }

    /// Hex encoding of the key
    pub fn to_hex(&self) -> Result<String> {
        // SAFETY: `to_hex` consumes `this` and returns a raw UTF-8 buffer.
        let to_hex: ObjectToBufferFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "to_hex")? };

        let this = self.handle.for_call()?;
        self.bridge
            .call_buffer(None, |status| unsafe { to_hex(this.into_raw(), status) })?
            .into_string(BufferFormat::Raw)
    }

    /// The matching public key
    pub fn public_key(&self) -> Result<PublicKey> {
        let vtable = self.bridge.handle_vtable(PublicKey::TYPE_NAME)?;
        // SAFETY: `public_key` consumes `this` and returns a new public key.
        let public_key: ObjectToObjectFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "public_key")? };

        let this = self.handle.for_call()?;
        let handle = self.bridge.call_object(vtable, None, |status| unsafe {
            public_key(this.into_raw(), status)
        })?;
        Ok(PublicKey {
            handle,
            bridge: self.bridge.clone(),
        })
    }

    /// Release the native key. Later calls fail with `Disposed`.
    pub fn dispose(&mut self) {
        self.handle.dispose();
    }

    /// Whether [`SecretKey::dispose`] was called
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("disposed", &self.handle.is_disposed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PUBLIC KEY
// ============================================================================

/// A native public key
pub struct PublicKey {
    handle: Handle,
    bridge: Bridge,
}

impl PublicKey {
    pub(crate) const TYPE_NAME: &'static str = "publickey";

    /// Hex encoding of the key
    pub fn to_hex(&self) -> Result<String> {
        // SAFETY: `to_hex` consumes `this` and returns a raw UTF-8 buffer.
        let to_hex: ObjectToBufferFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "to_hex")? };

        let this = self.handle.for_call()?;
        self.bridge
            .call_buffer(None, |status| unsafe { to_hex(this.into_raw(), status) })?
            .into_string(BufferFormat::Raw)
    }

    /// Release the native key
    pub fn dispose(&mut self) {
        self.handle.dispose();
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
