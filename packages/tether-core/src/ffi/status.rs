//! # Call Status
//!
//! The trailing out-parameter of every fallible entry point, and the
//! decoding of the error buffer it may carry.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ERROR BUFFER DECODING ORDER                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  code == 1 ─────────────────────────────────► category "Panic"         │
//! │                                                                         │
//! │  code >= 2:                                                             │
//! │    1. i32 variant + lp message, variant known to the ErrorSchema       │
//! │    2. length-prefixed UTF-8 string                                     │
//! │    3. raw UTF-8 string                                                 │
//! │    4. hex dump                                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use super::buffer::{BufferFormat, BufferVTable};
use super::types::OwnedBuffer;
use crate::codec::Reader;
use crate::error::{Error, NativeError, Result};

/// Status code for a successful call
pub const CALL_SUCCESS: i8 = 0;

/// Status code for an unexpected panic on the native side
pub const CALL_PANIC: i8 = 1;

/// Status record written by the native side
#[repr(C)]
#[derive(Debug, Default)]
pub struct CallStatus {
    /// 0 = success, 1 = panic, anything else = typed error
    pub code: i8,
    /// Serialized error, populated only when `code != 0`
    pub error_buf: OwnedBuffer,
}

impl CallStatus {
    /// A zeroed success status, ready to pass to a native call
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the native side reported success
    pub fn is_success(&self) -> bool {
        self.code == CALL_SUCCESS
    }

    /// Consume the status, turning a failure into [`Error::Native`]
    ///
    /// The error buffer is copied and freed before this returns, on every
    /// path.
    pub fn check(self, buffers: &BufferVTable, schema: Option<&ErrorSchema>) -> Result<()> {
        let CallStatus { code, error_buf } = self;

        if code == CALL_SUCCESS {
            if error_buf.is_allocated() {
                buffers.release(error_buf);
            }
            return Ok(());
        }

        let bytes = buffers.lift(error_buf);
        let error = decode_error(code, &bytes, schema);
        tracing::debug!(
            code,
            category = %error.category,
            "native call failed"
        );
        Err(Error::Native(error))
    }
}

// ============================================================================
// ERROR SCHEMA
// ============================================================================

/// Variant names of a native error enum, in declaration order
///
/// Variant indices on the wire are 1-based: index 1 is `variants[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSchema {
    /// Name of the native error type
    pub type_name: &'static str,
    /// Variant names in declaration order
    pub variants: &'static [&'static str],
}

impl ErrorSchema {
    /// Describe an error enum
    pub const fn new(type_name: &'static str, variants: &'static [&'static str]) -> Self {
        Self {
            type_name,
            variants,
        }
    }

    /// Name of the variant at a 1-based wire index
    pub fn variant_name(&self, index: i32) -> Option<&'static str> {
        let slot = usize::try_from(index).ok()?.checked_sub(1)?;
        self.variants.get(slot).copied()
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode the contents of an error buffer
///
/// Never fails: anything that is not understood ends up as a hex dump in
/// the message.
pub fn decode_error(code: i8, bytes: &[u8], schema: Option<&ErrorSchema>) -> NativeError {
    if code == CALL_PANIC {
        return NativeError {
            code,
            category: "Panic".into(),
            variant: None,
            message: decode_message(bytes),
        };
    }

    if let Some(schema) = schema {
        if let Some((variant, name, message)) = decode_structured(bytes, schema) {
            return NativeError {
                code,
                category: name.into(),
                variant: Some(variant),
                message,
            };
        }
    }

    NativeError {
        code,
        category: schema.map_or("Unknown", |s| s.type_name).into(),
        variant: None,
        message: decode_message(bytes),
    }
}

fn decode_structured(bytes: &[u8], schema: &ErrorSchema) -> Option<(i32, &'static str, String)> {
    let mut reader = Reader::new(bytes);
    let variant = reader.read_variant().ok()?;
    let name = schema.variant_name(variant)?;
    let message = if reader.remaining() == 0 {
        String::new()
    } else {
        reader.read_string().ok()?
    };
    reader.finish().ok()?;
    Some((variant, name, message))
}

fn decode_message(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    BufferFormat::LengthPrefixed
        .unwrap(bytes)
        .ok()
        .and_then(|payload| String::from_utf8(payload).ok())
        .or_else(|| std::str::from_utf8(bytes).ok().map(str::to_owned))
        .unwrap_or_else(|| format!("0x{}", hex::encode(bytes)))
}

// ============================================================================
// TESTS
// ============================================================================
