//! # Bridge Context
//!
//! One value tying together everything a typed wrapper needs to reach the
//! native library.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             BRIDGE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SymbolSource ──► symbol cache ──► typed fn pointers                    │
//! │  SymbolNames      (RwLock)         HandleVTable / FutureVTable<T>       │
//! │                                                                         │
//! │  BufferVTable     lower / lift / guard                                  │
//! │  AsyncStrategy    how call_async waits                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Bridge` is cheap to clone; every wrapper object keeps one.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{AsyncStrategy, BridgeConfig};
use crate::error::{Error, Result};
use crate::ffi::{
    BufferFreeFn, BufferFromBytesFn, BufferVTable, CallStatus, ErrorSchema, FutureHandle,
    FutureOp, FutureResult, FutureVTable, Handle, HandleVTable, LibraryLocator, NativeBuffer,
    NativeFuture, ObjectCloneFn, ObjectFreeFn, OwnedBuffer, SymbolNames, SymbolSource,
};

/// Shared handle to a loaded native library
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    names: SymbolNames,
    source: Box<dyn SymbolSource>,
    cache: RwLock<HashMap<String, usize>>,
    buffers: BufferVTable,
    strategy: AsyncStrategy,
}

impl Bridge {
    /// Locate and open the configured library.
    ///
    /// # Safety
    ///
    /// The library runs initialization code on load, and its entry points
    /// must follow the calling convention this crate expects.
    pub unsafe fn load(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let locator = LibraryLocator::new(config.search_paths.clone());
        let library = locator.open(&config.library)?;
        Self::from_source(config, library)
    }

    /// Build a bridge over any symbol source.
    ///
    /// # Safety
    ///
    /// Every address the source returns must be a function with the
    /// signature its name implies.
    pub unsafe fn from_source(
        config: &BridgeConfig,
        source: impl SymbolSource + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let names = SymbolNames::new(config.namespace.clone(), config.ffi_namespace());

        let from_bytes: BufferFromBytesFn =
            cast_address(lookup(&source, &names.buffer_from_bytes())?)?;
        let free: BufferFreeFn = cast_address(lookup(&source, &names.buffer_free())?)?;

        tracing::debug!(
            source = %source.describe(),
            namespace = names.namespace(),
            ffi_namespace = names.ffi_namespace(),
            strategy = ?config.strategy,
            "bridge ready"
        );

        Ok(Self {
            inner: Arc::new(BridgeInner {
                names,
                source: Box::new(source),
                cache: RwLock::new(HashMap::new()),
                buffers: BufferVTable::new(from_bytes, free),
                strategy: config.strategy.clone(),
            }),
        })
    }

    /// Symbol naming for this library
    pub fn names(&self) -> &SymbolNames {
        &self.inner.names
    }

    /// Buffer entry points
    pub fn buffers(&self) -> &BufferVTable {
        &self.inner.buffers
    }

    /// How async calls wait
    pub fn strategy(&self) -> &AsyncStrategy {
        &self.inner.strategy
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    fn address(&self, symbol: &str) -> Result<usize> {
        if let Some(address) = self.inner.cache.read().get(symbol) {
            return Ok(*address);
        }

        let address = lookup(self.inner.source.as_ref(), symbol)?;
        self.inner.cache.write().insert(symbol.to_string(), address);
        Ok(address)
    }

    /// Resolve `symbol` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be the `unsafe extern "C" fn` type matching the symbol's C
    /// signature.
    pub unsafe fn resolve<F: Copy>(&self, symbol: &str) -> Result<F> {
        cast_address(self.address(symbol)?)
    }

    /// Clone/free entry points for `type_name`
    pub fn handle_vtable(&self, type_name: &'static str) -> Result<HandleVTable> {
        // SAFETY: the naming convention fixes both signatures.
        unsafe {
            let clone: ObjectCloneFn = self.resolve(&self.inner.names.clone_fn(type_name))?;
            let free: ObjectFreeFn = self.resolve(&self.inner.names.free_fn(type_name))?;
            Ok(HandleVTable::new(type_name, clone, free, self.inner.buffers))
        }
    }

    /// Future entry points for the shape of `T`
    pub fn future_vtable<T: FutureResult>(&self) -> Result<FutureVTable<T>> {
        let names = &self.inner.names;
        // SAFETY: the naming convention fixes all four signatures per shape.
        unsafe {
            Ok(FutureVTable::new(
                self.resolve(&names.future(FutureOp::Poll, T::SHAPE))?,
                self.resolve(&names.future(FutureOp::Complete, T::SHAPE))?,
                self.resolve(&names.future(FutureOp::Free, T::SHAPE))?,
                self.resolve(&names.future(FutureOp::Cancel, T::SHAPE))?,
            ))
        }
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Run a synchronous native call and check its status
    pub fn call<R>(
        &self,
        schema: Option<&ErrorSchema>,
        f: impl FnOnce(&mut CallStatus) -> R,
    ) -> Result<R> {
        let mut status = CallStatus::new();
        let value = f(&mut status);
        status.check(&self.inner.buffers, schema)?;
        Ok(value)
    }

    /// Run a native call that returns a buffer
    ///
    /// The buffer is released on failure and guarded on success.
    pub fn call_buffer(
        &self,
        schema: Option<&ErrorSchema>,
        f: impl FnOnce(&mut CallStatus) -> OwnedBuffer,
    ) -> Result<NativeBuffer<'_>> {
        let mut status = CallStatus::new();
        let buffer = f(&mut status);
        match status.check(&self.inner.buffers, schema) {
            Ok(()) => Ok(self.inner.buffers.guard(buffer)),
            Err(e) => {
                self.inner.buffers.release(buffer);
                Err(e)
            }
        }
    }

    /// Run a native call that returns a new object reference
    ///
    /// Resolve `vtable` before making the call so a missing free function
    /// cannot strand the returned reference.
    pub fn call_object(
        &self,
        vtable: HandleVTable,
        schema: Option<&ErrorSchema>,
        f: impl FnOnce(&mut CallStatus) -> *mut c_void,
    ) -> Result<Handle> {
        let ptr = self.call(schema, f)?;
        // SAFETY: a successful call returned one owned reference.
        unsafe { Handle::wrap(ptr, vtable) }
    }

    /// Start a native async operation and wait for its result
    ///
    /// The future vtable is resolved before `start` runs.
    ///
    /// # Safety
    ///
    /// `start` must call an async entry point whose result shape is
    /// `T::SHAPE` and return the future handle it produced. Argument
    /// preparation inside `start` may fail before the native call.
    pub async unsafe fn call_async<T: FutureResult>(
        &self,
        schema: Option<&ErrorSchema>,
        start: impl FnOnce() -> Result<FutureHandle>,
    ) -> Result<T> {
        let future = self.start_future::<T>(start)?;
        future.wait(&self.inner.strategy, schema).await
    }

    /// Blocking form of [`Bridge::call_async`] for threads without a runtime.
    ///
    /// # Safety
    ///
    /// Same contract as [`Bridge::call_async`].
    pub unsafe fn call_blocking<T: FutureResult>(
        &self,
        schema: Option<&ErrorSchema>,
        start: impl FnOnce() -> Result<FutureHandle>,
    ) -> Result<T> {
        self.start_future::<T>(start)?.wait_blocking(schema)
    }

    unsafe fn start_future<T: FutureResult>(
        &self,
        start: impl FnOnce() -> Result<FutureHandle>,
    ) -> Result<NativeFuture<T>> {
        let vtable = self.future_vtable::<T>()?;
        let handle = start()?;
        Ok(NativeFuture::new(handle, vtable, self.inner.buffers))
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("source", &self.inner.source.describe())
            .field("names", &self.inner.names)
            .field("strategy", &self.inner.strategy)
            .finish()
    }
}

fn lookup(source: &dyn SymbolSource, symbol: &str) -> Result<usize> {
    match source.address(symbol) {
        Some(address) if address != 0 => Ok(address),
        _ => {
            tracing::warn!(symbol, source = %source.describe(), "symbol not found");
            Err(Error::SymbolNotFound {
                symbol: symbol.to_string(),
                source_name: source.describe(),
            })
        }
    }
}

unsafe fn cast_address<F: Copy>(address: usize) -> Result<F> {
    if mem::size_of::<F>() != mem::size_of::<usize>() {
        return Err(Error::Internal(format!(
            "cannot hold a function address in a {}-byte type",
            mem::size_of::<F>()
        )));
    }
    Ok(mem::transmute_copy::<usize, F>(&address))
}

// ============================================================================
// TESTS
// ============================================================================
