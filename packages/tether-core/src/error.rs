//! # Error Handling
//!
//! Error types for every failure the bridge can observe.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Handle Errors (100-199)                                           │
//! │  │   ├── Disposed              - Handle used after dispose()           │
//! │  │   └── NullHandle            - Native side returned a null object    │
//! │  │                                                                      │
//! │  ├── Native Call Errors (200-299)                                      │
//! │  │   └── Native                - CallStatus.code != 0                  │
//! │  │                                                                      │
//! │  ├── Future Errors (300-399)                                           │
//! │  │   ├── Timeout               - Retry ceiling exceeded while polling  │
//! │  │   └── FutureAbandoned       - Completion slot dropped unresolved    │
//! │  │                                                                      │
//! │  ├── Codec Errors (400-499)                                            │
//! │  │   ├── Decode                - Layout mismatch reading a buffer      │
//! │  │   └── Encode                - Value not representable on the wire   │
//! │  │                                                                      │
//! │  ├── Loading Errors (500-599)                                          │
//! │  │   ├── LibraryNotFound       - No candidate file on search paths     │
//! │  │   ├── LoadFailed            - dlopen/LoadLibrary failed             │
//! │  │   └── SymbolNotFound        - Entry point missing from the table    │
//! │  │                                                                      │
//! │  ├── Config Errors (600-699)                                           │
//! │  │   └── Config                - Invalid bridge configuration          │
//! │  │                                                                      │
//! │  └── Internal (900)                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ERROR HANDLING FLOW                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Native (C ABI)               Bridge                    Caller (Rust)  │
//! │  ──────────────────────────────────────────────────────────────────     │
//! │                                                                         │
//! │  CallStatus { code,  ──────►  copy + free error buffer ──► Err(Native) │
//! │    error_buf }                decode enum / string /                   │
//! │                               hex dump                                 │
//! │                                                                         │
//! │  Disposed handle, timeout and decode errors never reach the native     │
//! │  side and are never retried.                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Handle Errors (100-199)
    // ========================================================================

    /// A handle was used after it was disposed
    #[error("{type_name} handle has already been disposed")]
    Disposed {
        /// Native type name of the handle
        type_name: &'static str,
    },

    /// The native side handed back a null object pointer
    #[error("native call returned a null {type_name} pointer")]
    NullHandle {
        /// Native type name of the handle
        type_name: &'static str,
    },

    // ========================================================================
    // Native Call Errors (200-299)
    // ========================================================================

    /// A native call reported failure through its call status
    #[error(transparent)]
    Native(#[from] NativeError),

    // ========================================================================
    // Future Errors (300-399)
    // ========================================================================

    /// A native future did not become ready within the retry ceiling
    #[error("native future {handle:#x} not ready after {attempts} attempts")]
    Timeout {
        /// The future handle that timed out
        handle: u64,
        /// Number of readiness checks performed
        attempts: u32,
    },

    /// The completion slot for a future was dropped without a result
    #[error("native future {0:#x} was abandoned before it reported readiness")]
    FutureAbandoned(u64),

    // ========================================================================
    // Codec Errors (400-499)
    // ========================================================================

    /// A buffer did not match the layout the reader expected
    #[error("Decode error: {0}")]
    Decode(String),

    /// A value cannot be represented in the boundary encoding
    #[error("Encode error: {0}")]
    Encode(String),

    // ========================================================================
    // Loading Errors (500-599)
    // ========================================================================

    /// No library file matched on any search path
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    /// The dynamic loader refused the library
    #[error("Failed to load library: {0}")]
    LoadFailed(String),

    /// A required entry point is missing from the function table
    #[error("Symbol '{symbol}' not found in {source_name}")]
    SymbolNotFound {
        /// Fully qualified symbol name
        symbol: String,
        /// Description of the symbol source
        source_name: String,
    },

    // ========================================================================
    // Config Errors (600-699)
    // ========================================================================

    /// Invalid bridge configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Handle lifecycle
    /// - 200-299: Native call failures
    /// - 300-399: Futures
    /// - 400-499: Codec
    /// - 500-599: Library loading
    /// - 600-699: Configuration
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::Disposed { .. } => 100,
            Error::NullHandle { .. } => 101,

            Error::Native(e) if e.is_panic() => 201,
            Error::Native(_) => 200,

            Error::Timeout { .. } => 300,
            Error::FutureAbandoned(_) => 301,

            Error::Decode(_) => 400,
            Error::Encode(_) => 401,

            Error::LibraryNotFound(_) => 500,
            Error::LoadFailed(_) => 501,
            Error::SymbolNotFound { .. } => 502,

            Error::Config(_) => 600,

            Error::Internal(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors may succeed if the operation is started again.
    /// Nothing in the bridge retries them automatically.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::FutureAbandoned(_))
    }

    /// Check if this error is a host-side programming error
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::Disposed { .. } | Error::NullHandle { .. } | Error::Encode(_)
        )
    }

    /// The decoded native error, if this error came from a call status
    pub fn as_native(&self) -> Option<&NativeError> {
        match self {
            Error::Native(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// NATIVE ERROR
// ============================================================================

/// A failure reported by the native side through a call status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Raw call status code (1 = panic, anything else = typed error)
    pub code: i8,
    /// Error category: the variant name for structured errors, `Panic`,
    /// or the error type name when the variant could not be determined
    pub category: String,
    /// Variant index, when the error buffer held a structured enum
    pub variant: Option<i32>,
    /// Best-effort human readable detail
    pub message: String,
}

impl NativeError {
    /// Whether the native side reported an unexpected panic
    pub fn is_panic(&self) -> bool {
        self.code == crate::ffi::CALL_PANIC
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native call failed [{}] {}: {}",
            self.code, self.category, self.message
        )
    }
}

impl std::error::Error for NativeError {}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<libloading::Error> for Error {
    fn from(err: libloading::Error) -> Self {
        Error::LoadFailed(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
