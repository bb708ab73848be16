//! # Native Futures
//!
//! Drives an asynchronous native operation to completion from the host.
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       NATIVE FUTURE STATES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Started ──poll──► Polling ──wake──► WakePending ──poll──► Polling     │
//! │                       │                                                 │
//! │                     ready                                               │
//! │                       ▼                                                 │
//! │                     Ready ──complete──► Completed ──free──► Freed      │
//! │                                                                         │
//! │  any unfinished state ──cancel──► Cancelled ──free──► Freed            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `free` always runs exactly once, from `Drop`, whichever way the future
//! ends: success, error, timeout, or the awaiting task being dropped.
//!
//! ## Strategies
//!
//! | Strategy     | Waiting on the callback                              |
//! |--------------|------------------------------------------------------|
//! | `Callback`   | oneshot channel resolved from the native thread      |
//! | `TimedRetry` | atomic latch checked every interval, with a ceiling  |
//!
//! Without an async runtime, [`NativeFuture::wait_blocking`] parks the
//! calling thread on the same channel.

use std::ffi::c_void;
use std::fmt;
use std::time::Duration;

use super::buffer::BufferVTable;
use super::state::{continuation_callback, registry, ContinuationFn, PollResult};
use super::status::{CallStatus, ErrorSchema};
use super::types::OwnedBuffer;
use crate::config::AsyncStrategy;
use crate::error::{Error, Result};

/// Token for one in-flight native operation
pub type FutureHandle = u64;

/// `<ffi_ns>_rust_future_poll_<shape>`
pub type FuturePollFn =
    unsafe extern "C" fn(handle: FutureHandle, callback: ContinuationFn, data: u64);

/// `<ffi_ns>_rust_future_complete_<shape>`
pub type FutureCompleteFn<T> =
    unsafe extern "C" fn(handle: FutureHandle, status: *mut CallStatus) -> T;

/// `<ffi_ns>_rust_future_free_<shape>`
pub type FutureFreeFn = unsafe extern "C" fn(handle: FutureHandle);

/// `<ffi_ns>_rust_future_cancel_<shape>`
pub type FutureCancelFn = unsafe extern "C" fn(handle: FutureHandle);

// ============================================================================
// RESULT SHAPES
// ============================================================================

/// Result shape of a native future; each has its own entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// Object pointer
    Pointer,
    /// Owned buffer
    Buffer,
    /// No value
    Void,
    /// 64-bit signed integer
    I64,
}

impl ResultShape {
    /// Symbol suffix for this shape
    pub fn suffix(self) -> &'static str {
        match self {
            ResultShape::Pointer => "pointer",
            ResultShape::Buffer => "rust_buffer",
            ResultShape::Void => "void",
            ResultShape::I64 => "i64",
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for *mut std::ffi::c_void {}
    impl Sealed for super::OwnedBuffer {}
    impl Sealed for () {}
    impl Sealed for i64 {}
}

/// A value a native future can complete with
pub trait FutureResult: sealed::Sealed + Sized {
    /// Which entry point family returns this type
    const SHAPE: ResultShape;

    /// Release native resources held by a value returned alongside a
    /// failed status
    fn release_on_error(self, _buffers: &BufferVTable) {}
}

impl FutureResult for *mut c_void {
    const SHAPE: ResultShape = ResultShape::Pointer;
}

impl FutureResult for OwnedBuffer {
    const SHAPE: ResultShape = ResultShape::Buffer;

    fn release_on_error(self, buffers: &BufferVTable) {
        buffers.release(self);
    }
}

impl FutureResult for () {
    const SHAPE: ResultShape = ResultShape::Void;
}

impl FutureResult for i64 {
    const SHAPE: ResultShape = ResultShape::I64;
}

// ============================================================================
// VTABLE
// ============================================================================

/// The poll/complete/free/cancel quadruple of one result shape
pub struct FutureVTable<T: FutureResult> {
    poll: FuturePollFn,
    complete: FutureCompleteFn<T>,
    free: FutureFreeFn,
    cancel: FutureCancelFn,
}

impl<T: FutureResult> FutureVTable<T> {
    /// Build a vtable from resolved entry points.
    ///
    /// # Safety
    ///
    /// All four functions must be the `T::SHAPE` family of one library.
    pub unsafe fn new(
        poll: FuturePollFn,
        complete: FutureCompleteFn<T>,
        free: FutureFreeFn,
        cancel: FutureCancelFn,
    ) -> Self {
        Self {
            poll,
            complete,
            free,
            cancel,
        }
    }
}

impl<T: FutureResult> Clone for FutureVTable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: FutureResult> Copy for FutureVTable<T> {}

impl<T: FutureResult> fmt::Debug for FutureVTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureVTable")
            .field("shape", &T::SHAPE)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// NATIVE FUTURE
// ============================================================================

/// Where a native future is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    /// Returned by the async entry point, never polled
    Started,
    /// A poll was issued and its callback has not arrived
    Polling,
    /// The last poll asked to be polled again
    WakePending,
    /// The last poll reported readiness
    Ready,
    /// The result was retrieved
    Completed,
    /// Waiting was abandoned
    Cancelled,
    /// The native future was freed
    Freed,
}

/// Host-side owner of one native future handle
pub struct NativeFuture<T: FutureResult> {
    handle: FutureHandle,
    vtable: FutureVTable<T>,
    buffers: BufferVTable,
    state: FutureState,
    polls: u32,
}

impl<T: FutureResult> NativeFuture<T> {
    /// Take ownership of a future handle.
    ///
    /// # Safety
    ///
    /// `handle` must come from an async entry point whose result shape is
    /// `T::SHAPE`, and `vtable`/`buffers` must belong to the same library.
    pub unsafe fn new(
        handle: FutureHandle,
        vtable: FutureVTable<T>,
        buffers: BufferVTable,
    ) -> Self {
        tracing::trace!(handle, shape = ?T::SHAPE, "native future started");
        Self {
            handle,
            vtable,
            buffers,
            state: FutureState::Started,
            polls: 0,
        }
    }

    /// The native future handle
    pub fn handle(&self) -> FutureHandle {
        self.handle
    }

    /// Current state
    pub fn state(&self) -> FutureState {
        self.state
    }

    /// Number of native polls issued so far
    pub fn poll_count(&self) -> u32 {
        self.polls
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state,
            FutureState::Completed | FutureState::Cancelled | FutureState::Freed
        )
    }

    fn issue_poll(&mut self, data: u64) {
        self.state = FutureState::Polling;
        self.polls += 1;
        tracing::trace!(handle = self.handle, poll = self.polls, "polling native future");
        // SAFETY: the handle is live until `free`, and the registry lock is
        // not held here.
        unsafe { (self.vtable.poll)(self.handle, continuation_callback, data) };
    }

    fn record(&mut self, result: PollResult) -> PollResult {
        self.state = match result {
            PollResult::Ready => FutureState::Ready,
            PollResult::Wake => FutureState::WakePending,
        };
        result
    }

    // ------------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------------

    /// Issue one poll and wait for its callback
    ///
    /// Returns `Ok(None)` without touching the native side once the future
    /// is completed, cancelled or freed.
    pub async fn poll(&mut self) -> Result<Option<PollResult>> {
        if self.is_finished() {
            return Ok(None);
        }

        let (pending, rx) = registry().register_notify();
        self.issue_poll(pending.id());
        let result = rx.await.map_err(|_| Error::FutureAbandoned(self.handle))?;
        drop(pending);

        Ok(Some(self.record(result)))
    }

    /// Issue one poll and block the current thread until its callback
    ///
    /// Must not be called from inside an async runtime.
    pub fn poll_blocking(&mut self) -> Result<Option<PollResult>> {
        if self.is_finished() {
            return Ok(None);
        }

        let (pending, rx) = registry().register_notify();
        self.issue_poll(pending.id());
        let result = rx
            .blocking_recv()
            .map_err(|_| Error::FutureAbandoned(self.handle))?;
        drop(pending);

        Ok(Some(self.record(result)))
    }

    /// Retrieve the result after readiness was reported
    ///
    /// Returns `None` if the future already completed or was cancelled.
    /// A result returned alongside a failed status is released before the
    /// error is returned.
    pub fn complete(&mut self, schema: Option<&ErrorSchema>) -> Option<Result<T>> {
        match self.state {
            FutureState::Completed | FutureState::Cancelled | FutureState::Freed => return None,
            FutureState::Ready => {}
            other => {
                return Some(Err(Error::Internal(format!(
                    "native future {:#x} completed while {:?}",
                    self.handle, other
                ))))
            }
        }

        let mut status = CallStatus::new();
        // SAFETY: readiness was reported and complete runs once.
        let value = unsafe { (self.vtable.complete)(self.handle, &mut status) };
        self.state = FutureState::Completed;
        tracing::trace!(handle = self.handle, polls = self.polls, "native future completed");

        match status.check(&self.buffers, schema) {
            Ok(()) => Some(Ok(value)),
            Err(e) => {
                value.release_on_error(&self.buffers);
                Some(Err(e))
            }
        }
    }

    /// Stop waiting; the native future is cancelled, then freed
    pub fn cancel(mut self) {
        self.cancel_in_place();
    }

    fn cancel_in_place(&mut self) {
        if self.is_finished() {
            return;
        }
        tracing::debug!(handle = self.handle, state = ?self.state, "cancelling native future");
        // SAFETY: the handle is live until `free`.
        unsafe { (self.vtable.cancel)(self.handle) };
        self.state = FutureState::Cancelled;
    }

    fn free_in_place(&mut self) {
        if self.state == FutureState::Freed {
            return;
        }
        // SAFETY: this is the only call to free for this handle.
        unsafe { (self.vtable.free)(self.handle) };
        self.state = FutureState::Freed;
        tracing::trace!(handle = self.handle, "native future freed");
    }

    fn finish(&mut self, schema: Option<&ErrorSchema>) -> Result<T> {
        self.complete(schema).unwrap_or_else(|| {
            Err(Error::Internal(format!(
                "native future {:#x} has no result to retrieve",
                self.handle
            )))
        })
    }

    // ------------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------------

    /// Drive the future to completion with the given strategy
    pub async fn wait(
        mut self,
        strategy: &AsyncStrategy,
        schema: Option<&ErrorSchema>,
    ) -> Result<T> {
        match *strategy {
            AsyncStrategy::Callback {
                yield_between_polls,
            } => self.drive_callback(yield_between_polls).await?,
            AsyncStrategy::TimedRetry {
                interval_ms,
                max_attempts,
            } => {
                self.drive_timed(Duration::from_millis(interval_ms), max_attempts)
                    .await?
            }
        }
        self.finish(schema)
    }

    /// Drive the future to completion on the current thread
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(mut self, schema: Option<&ErrorSchema>) -> Result<T> {
        loop {
            match self.poll_blocking()? {
                Some(PollResult::Ready) => break,
                Some(PollResult::Wake) => continue,
                None => break,
            }
        }
        self.finish(schema)
    }

    async fn drive_callback(&mut self, yield_between_polls: bool) -> Result<()> {
        loop {
            match self.poll().await? {
                Some(PollResult::Ready) | None => return Ok(()),
                Some(PollResult::Wake) => {
                    if yield_between_polls {
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
    }

    /// Every latch check counts toward `max_attempts`, including checks that
    /// find a wake. A wake is followed by one interval before the next poll.
    async fn drive_timed(&mut self, interval: Duration, max_attempts: u32) -> Result<()> {
        let mut attempts = 0u32;

        while !self.is_finished() {
            let (pending, latch) = registry().register_latch();
            self.issue_poll(pending.id());

            loop {
                let woke = match latch.get() {
                    Some(PollResult::Ready) => {
                        self.record(PollResult::Ready);
                        return Ok(());
                    }
                    Some(PollResult::Wake) => {
                        self.record(PollResult::Wake);
                        true
                    }
                    None => false,
                };

                if attempts >= max_attempts {
                    tracing::warn!(
                        handle = self.handle,
                        attempts,
                        polls = self.polls,
                        "native future not ready, giving up"
                    );
                    return Err(Error::Timeout {
                        handle: self.handle,
                        attempts,
                    });
                }
                attempts += 1;
                tokio::time::sleep(interval).await;

                if woke {
                    break;
                }
            }
        }

        Ok(())
    }
}

impl<T: FutureResult> Drop for NativeFuture<T> {
    fn drop(&mut self) {
        if self.state == FutureState::Freed {
            return;
        }
        if !self.is_finished() {
            self.cancel_in_place();
        }
        self.free_in_place();
    }
}

impl<T: FutureResult> fmt::Debug for NativeFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFuture")
            .field("handle", &self.handle)
            .field("shape", &T::SHAPE)
            .field("state", &self.state)
            .field("polls", &self.polls)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
