//! Big-endian writer for boundary values.

use bytes::{BufMut, Bytes, BytesMut};

use super::{wire_len, Encode, OPTION_NONE, OPTION_SOME};
use crate::error::Result;
use crate::ffi::CallPointer;

/// Appends values in the boundary encoding
///
/// Handles written with [`Writer::write_handle`] stay owned by the writer.
/// They pass to the native side only when the bridge lowers the writer into
/// a call argument. Finishing the writer into plain bytes, or dropping it,
/// releases them.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
    handles: Vec<CallPointer>,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            handles: Vec::new(),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// The bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whether nothing was written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // ------------------------------------------------------------------------
    // Fixed width
    // ------------------------------------------------------------------------

    /// Write an `i8`
    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Write a `u8`
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write a big-endian `i16`
    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    /// Write a big-endian `u16`
    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    /// Write a big-endian `i32`
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Write a big-endian `u32`
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Write a big-endian `i64`
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Write a big-endian `u64`
    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Write a big-endian IEEE-754 `f32`
    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    /// Write a big-endian IEEE-754 `f64`
    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    /// Write a bool as one byte, 0 or 1
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_i8(i8::from(value));
    }

    // ------------------------------------------------------------------------
    // Variable width
    // ------------------------------------------------------------------------

    /// Write an `i32` length followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = wire_len(bytes.len())?;
        self.buf.reserve(4 + bytes.len());
        self.buf.put_i32(len);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Write an `i32` length followed by the UTF-8 bytes
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a 1-based enum variant index
    pub fn write_variant(&mut self, index: i32) {
        self.buf.put_i32(index);
    }

    /// Embed a native reference as its 8-byte pointer value
    pub fn write_handle(&mut self, pointer: CallPointer) {
        self.buf.put_u64(pointer.as_u64());
        self.handles.push(pointer);
    }

    /// Write a raw pointer value that carries no reference
    pub(crate) fn write_pointer(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Write an option: tag 0, or tag 1 followed by the value
    pub fn write_option<T: Encode>(&mut self, value: Option<&T>) -> Result<()> {
        match value {
            None => {
                self.buf.put_i8(OPTION_NONE);
                Ok(())
            }
            Some(inner) => {
                self.buf.put_i8(OPTION_SOME);
                inner.encode(self)
            }
        }
    }

    /// Write an `i32` count followed by each item
    pub fn write_seq<T: Encode>(&mut self, items: &[T]) -> Result<()> {
        self.buf.put_i32(wire_len(items.len())?);
        for item in items {
            item.encode(self)?;
        }
        Ok(())
    }

    /// Write any encodable value
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.encode(self)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Finish writing and return the encoded bytes
    ///
    /// Embedded handles are released: pointer values in the result no longer
    /// carry a reference.
    pub fn finish(self) -> Vec<u8> {
        self.into_bytes().to_vec()
    }

    /// Same as [`Writer::finish`], without copying
    pub fn into_bytes(self) -> Bytes {
        let Writer { buf, handles } = self;
        if !handles.is_empty() {
            tracing::trace!(handles = handles.len(), "releasing handles of a finished writer");
        }
        drop(handles);
        buf.freeze()
    }

    /// Hand every embedded reference to the native side
    ///
    /// Called once the encoded bytes are in a buffer a native call consumes.
    pub(crate) fn commit_handles(self) {
        for pointer in self.handles {
            let _ = pointer.into_raw();
        }
    }
}
