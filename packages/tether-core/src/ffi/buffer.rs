//! # Buffer Transfer
//!
//! Moving bytes across the boundary in both directions.
//!
//! ## Lowering (host → native)
//!
//! ```text
//! host &[u8] ──► ForeignBytes (borrowed) ──► rustbuffer_from_bytes ──► OwnedBuffer
//!                                             (native copies)
//! ```
//!
//! ## Lifting (native → host)
//!
//! ```text
//! OwnedBuffer ──► NativeBuffer guard ──► copy into Vec<u8> ──► rustbuffer_free
//! ```
//!
//! ## Sub-formats
//!
//! | Format           | Layout                          | Used for                       |
//! |------------------|---------------------------------|--------------------------------|
//! | `Raw`            | bytes as-is                     | hex and UTF-8 string arguments |
//! | `LengthPrefixed` | 4-byte BE i32 length + payload  | nested `Vec<u8>` / `String`    |

use bytes::{Buf, BufMut, BytesMut};

use super::status::CallStatus;
use super::types::{BufferFreeFn, BufferFromBytesFn, ForeignBytes, OwnedBuffer};
use crate::codec::Writer;
use crate::error::{Error, Result};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

// ============================================================================
// BUFFER FORMAT
// ============================================================================

/// Layout of the bytes carried by a top-level buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    /// Bytes passed through unchanged
    Raw,
    /// Big-endian `i32` length followed by exactly that many bytes
    LengthPrefixed,
}

impl BufferFormat {
    /// Frame a payload in this format
    pub fn wrap(self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            BufferFormat::Raw => Ok(payload.to_vec()),
            BufferFormat::LengthPrefixed => {
                let len = crate::codec::wire_len(payload.len())?;
                let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
                buf.put_i32(len);
                buf.put_slice(payload);
                Ok(buf.to_vec())
            }
        }
    }

    /// Extract the payload from bytes framed in this format
    pub fn unwrap(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            BufferFormat::Raw => Ok(data.to_vec()),
            BufferFormat::LengthPrefixed => {
                if data.len() < LENGTH_PREFIX_SIZE {
                    return Err(Error::Decode(format!(
                        "length-prefixed buffer too short: {} bytes",
                        data.len()
                    )));
                }

                let mut cursor = data;
                let len = cursor.get_i32();
                let len = usize::try_from(len).map_err(|_| {
                    Error::Decode(format!("negative length prefix: {}", len))
                })?;

                if cursor.len() != len {
                    return Err(Error::Decode(format!(
                        "length prefix says {} bytes, buffer carries {}",
                        len,
                        cursor.len()
                    )));
                }

                Ok(cursor.to_vec())
            }
        }
    }
}

// ============================================================================
// BUFFER VTABLE
// ============================================================================

/// The pair of buffer entry points every bridge needs
#[derive(Clone, Copy)]
pub struct BufferVTable {
    from_bytes: BufferFromBytesFn,
    free: BufferFreeFn,
}

impl std::fmt::Debug for BufferVTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferVTable").finish_non_exhaustive()
    }
}

impl BufferVTable {
    /// Build a vtable from resolved entry points.
    ///
    /// # Safety
    ///
    /// Both functions must follow the `rustbuffer_from_bytes` /
    /// `rustbuffer_free` contract of the same native library.
    pub unsafe fn new(from_bytes: BufferFromBytesFn, free: BufferFreeFn) -> Self {
        Self { from_bytes, free }
    }

    /// Copy host bytes into a new native-owned buffer
    pub fn lower(&self, bytes: &[u8]) -> Result<OwnedBuffer> {
        let foreign = ForeignBytes::new(bytes)?;
        let mut status = CallStatus::new();
        // SAFETY: `foreign` borrows `bytes`, which outlives the call.
        let buffer = unsafe { (self.from_bytes)(foreign, &mut status) };

        match status.check(self, None) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                self.release(buffer);
                Err(e)
            }
        }
    }

    /// Lower a payload in the given sub-format
    pub fn lower_as(&self, format: BufferFormat, payload: &[u8]) -> Result<OwnedBuffer> {
        match format {
            BufferFormat::Raw => self.lower(payload),
            BufferFormat::LengthPrefixed => self.lower(&format.wrap(payload)?),
        }
    }

    /// Lower bytes unchanged
    pub fn lower_raw(&self, payload: &[u8]) -> Result<OwnedBuffer> {
        self.lower_as(BufferFormat::Raw, payload)
    }

    /// Lower bytes behind a length prefix
    pub fn lower_prefixed(&self, payload: &[u8]) -> Result<OwnedBuffer> {
        self.lower_as(BufferFormat::LengthPrefixed, payload)
    }

    /// Lower a string as raw UTF-8
    pub fn lower_str(&self, value: &str) -> Result<OwnedBuffer> {
        self.lower_raw(value.as_bytes())
    }

    /// Lower the output of a codec writer
    ///
    /// Handles embedded in the writer pass to the native side only once the
    /// buffer exists; if lowering fails they are released.
    pub fn lower_encoded(&self, writer: Writer) -> Result<OwnedBuffer> {
        let buffer = self.lower(writer.as_bytes())?;
        writer.commit_handles();
        Ok(buffer)
    }

    /// Take ownership of a native buffer; it is freed when the guard drops
    pub fn guard(&self, buffer: OwnedBuffer) -> NativeBuffer<'_> {
        NativeBuffer {
            buffer: Some(buffer),
            vtable: self,
        }
    }

    /// Copy a native buffer into host memory and free it
    pub fn lift(&self, buffer: OwnedBuffer) -> Vec<u8> {
        self.guard(buffer).to_vec()
    }

    /// Lift a buffer holding raw UTF-8
    pub fn lift_raw_string(&self, buffer: OwnedBuffer) -> Result<String> {
        self.guard(buffer).into_string(BufferFormat::Raw)
    }

    /// Lift a buffer holding length-prefixed bytes
    pub fn lift_prefixed_bytes(&self, buffer: OwnedBuffer) -> Result<Vec<u8>> {
        self.guard(buffer).into_bytes(BufferFormat::LengthPrefixed)
    }

    /// Lift a buffer holding a length-prefixed UTF-8 string
    pub fn lift_prefixed_string(&self, buffer: OwnedBuffer) -> Result<String> {
        self.guard(buffer).into_string(BufferFormat::LengthPrefixed)
    }

    /// Hand a buffer back to the native allocator
    pub(crate) fn release(&self, buffer: OwnedBuffer) {
        if !buffer.is_allocated() {
            return;
        }

        let mut status = CallStatus::new();
        // SAFETY: the buffer came from this library and is released once.
        unsafe { (self.free)(buffer, &mut status) };

        if !status.is_success() {
            // The error buffer of a failed free is left alone: the allocator
            // that produced it just reported a failure.
            tracing::error!(code = status.code, "native buffer free failed");
        }
    }
}

// ============================================================================
// NATIVE BUFFER GUARD
// ============================================================================

/// A native-owned buffer that is freed when dropped
pub struct NativeBuffer<'v> {
    buffer: Option<OwnedBuffer>,
    vtable: &'v BufferVTable,
}

impl NativeBuffer<'_> {
    /// Borrow the buffer contents
    pub fn as_bytes(&self) -> &[u8] {
        match &self.buffer {
            // SAFETY: the buffer is only freed in `Drop`.
            Some(buffer) => unsafe { buffer.as_slice() },
            None => &[],
        }
    }

    /// Number of bytes carried
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the buffer carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give up the guard, e.g. to pass the buffer as a call argument
    pub fn into_raw(mut self) -> OwnedBuffer {
        self.buffer.take().unwrap_or_default()
    }

    /// Copy the contents out, then free the buffer
    pub fn to_vec(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Copy out the payload of the given sub-format, then free the buffer
    pub fn into_bytes(self, format: BufferFormat) -> Result<Vec<u8>> {
        format.unwrap(self.as_bytes())
    }

    /// Copy out the payload as UTF-8, then free the buffer
    pub fn into_string(self, format: BufferFormat) -> Result<String> {
        let bytes = self.into_bytes(format)?;
        String::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
    }
}

impl Drop for NativeBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.vtable.release(buffer);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
