//! # FFI Layer
//!
//! The host side of the C ABI a native library exposes: memory transfer,
//! call status, object handles, futures, and symbol resolution.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         FFI ARCHITECTURE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Typed bindings (SecretKey, Wallet, Client, ...)                        │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     Host-side primitives                         │   │
//! │  │                                                                 │   │
//! │  │  buffer   OwnedBuffer lowering / lifting, sub-formats          │   │
//! │  │  status   CallStatus check, error buffer decoding              │   │
//! │  │  handle   clone-before-call, free-once                         │   │
//! │  │  future   poll / complete / free / cancel                      │   │
//! │  │  state    completion registry behind the continuation          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  library   SymbolSource: shared library or static table         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Native library (flat C function table)                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership Rules
//!
//! - Every buffer the native side returns is freed exactly once through
//!   `rustbuffer_free`.
//! - Buffers and object references passed as arguments belong to the
//!   callee.
//! - Every future handle is freed exactly once; unfinished futures are
//!   cancelled first.

mod buffer;
mod future;
mod handle;
mod library;
mod state;
mod status;
mod types;

pub use buffer::{BufferFormat, BufferVTable, NativeBuffer, LENGTH_PREFIX_SIZE};
pub use future::{
    FutureCancelFn, FutureCompleteFn, FutureFreeFn, FutureHandle, FuturePollFn, FutureResult,
    FutureState, FutureVTable, NativeFuture, ResultShape,
};
pub use handle::{CallPointer, Handle, HandleVTable};
pub use library::{
    DynamicLibrary, FutureOp, LibraryLocator, StaticSymbols, SymbolNames, SymbolSource,
};
pub use state::{continuation_callback, ContinuationFn, PollResult, POLL_READY, POLL_WAKE};
pub use status::{decode_error, CallStatus, ErrorSchema, CALL_PANIC, CALL_SUCCESS};
pub use types::{
    BufferFreeFn, BufferFromBytesFn, ForeignBytes, ObjectCloneFn, ObjectFreeFn, OwnedBuffer,
};
