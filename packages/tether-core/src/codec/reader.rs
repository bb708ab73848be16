//! Big-endian cursor over a lifted buffer.

use bytes::Buf;

use super::{Decode, OPTION_NONE, OPTION_SOME};
use crate::error::{Error, Result};
use crate::ffi::{Handle, HandleVTable};

/// Reads values in the boundary encoding
///
/// Every read checks the remaining length first; a short buffer is an
/// [`Error::Decode`], never a panic.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::Decode(format!(
                "{} needs {} bytes at offset {}, {} remaining",
                what,
                n,
                self.offset,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        self.offset += n;
        Ok(head)
    }

    // ------------------------------------------------------------------------
    // Fixed width
    // ------------------------------------------------------------------------

    /// Read an `i8`
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1, "i8")?.get_i8())
    }

    /// Read a `u8`
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?.get_u8())
    }

    /// Read a big-endian `i16`
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.take(2, "i16")?.get_i16())
    }

    /// Read a big-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.take(2, "u16")?.get_u16())
    }

    /// Read a big-endian `i32`
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.take(4, "i32")?.get_i32())
    }

    /// Read a big-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.take(4, "u32")?.get_u32())
    }

    /// Read a big-endian `i64`
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.take(8, "i64")?.get_i64())
    }

    /// Read a big-endian `u64`
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.take(8, "u64")?.get_u64())
    }

    /// Read a big-endian `f32`
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.take(4, "f32")?.get_f32())
    }

    /// Read a big-endian `f64`
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.take(8, "f64")?.get_f64())
    }

    /// Read a one-byte bool; anything but 0 or 1 is rejected
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_i8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Decode(format!(
                "invalid bool byte {} at offset {}",
                other,
                self.offset - 1
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Variable width
    // ------------------------------------------------------------------------

    fn read_len(&mut self, what: &str) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| Error::Decode(format!("negative {} length {}", what, len)))
    }

    /// Read an `i32` length followed by that many bytes
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len("byte string")?;
        Ok(self.take(len, "byte string")?.to_vec())
    }

    /// Read an `i32` length followed by that many UTF-8 bytes
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len("string")?;
        let start = self.offset;
        let bytes = self.take(len, "string")?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            Error::Decode(format!("invalid UTF-8 in string at offset {}: {}", start, e))
        })
    }

    /// Read a 1-based enum variant index
    ///
    /// The index is not validated here; match on it and report anything
    /// unexpected with [`unknown_variant`](super::unknown_variant).
    pub fn read_variant(&mut self) -> Result<i32> {
        self.read_i32()
    }

    /// Read an 8-byte pointer value
    pub fn read_pointer(&mut self) -> Result<u64> {
        self.read_u64()
    }

    /// Read an embedded native reference and take ownership of it
    ///
    /// # Safety
    ///
    /// The pointer at the cursor must carry one reference to an object of
    /// the vtable's type, transferred to the host.
    pub unsafe fn read_handle(&mut self, vtable: HandleVTable) -> Result<Handle> {
        let value = self.read_pointer()?;
        Handle::from_raw_u64(value, vtable)
    }

    /// Read an option tag and, when present, the value
    pub fn read_option<T: Decode>(&mut self) -> Result<Option<T>> {
        match self.read_i8()? {
            OPTION_NONE => Ok(None),
            OPTION_SOME => Ok(Some(T::decode(self)?)),
            tag => Err(Error::Decode(format!(
                "invalid option tag {} at offset {}",
                tag,
                self.offset - 1
            ))),
        }
    }

    /// Read an `i32` count followed by each item
    pub fn read_seq<T: Decode>(&mut self) -> Result<Vec<T>> {
        let count = self.read_len("sequence")?;
        // Every item takes at least one byte; cap the reservation accordingly.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    /// Read any decodable value
    pub fn read<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Require that the whole buffer was consumed
    pub fn finish(self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::Decode(format!(
                "{} trailing bytes after offset {}",
                self.buf.len(),
                self.offset
            )))
        }
    }
}
