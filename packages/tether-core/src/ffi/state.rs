//! # Completion Registry
//!
//! Global state shared between host tasks and the native runtime's worker
//! threads.
//!
//! Each poll of a native future registers a slot under a fresh
//! callback-context id and passes that id to the native poll function. The
//! native runtime later calls [`continuation_callback`] with the id and a
//! poll result, from whatever thread it likes, and the registry routes the
//! result to the waiting slot.
//!
//! ```text
//! ┌──────────────┐   poll(handle, continuation_callback, id)   ┌──────────┐
//! │  host task   │ ──────────────────────────────────────────► │  native  │
//! │              │                                             │ runtime  │
//! │  await slot  │ ◄──── registry.resolve(id, result) ◄─────── │  thread  │
//! └──────────────┘                                             └──────────┘
//! ```
//!
//! The registry lock is never held while calling into the native side, so a
//! callback delivered synchronously from inside `poll` cannot deadlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI8, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::oneshot;

// ============================================================================
// POLL RESULTS
// ============================================================================

/// Poll result: the future can be completed
pub const POLL_READY: i8 = 0;

/// Poll result: the future made progress, poll again
pub const POLL_WAKE: i8 = 1;

/// Latch value before any result arrived
const LATCH_PENDING: i8 = -1;

/// Continuation callback handed to native poll functions
pub type ContinuationFn = extern "C" fn(data: u64, poll_result: i8);

/// Outcome of one native poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// Ready to complete
    Ready,
    /// Not ready; poll again
    Wake,
}

impl PollResult {
    /// Interpret a raw poll result. Unknown values are treated as a wake,
    /// which only costs one more poll.
    pub fn from_raw(raw: i8) -> Self {
        if raw == POLL_READY {
            PollResult::Ready
        } else {
            PollResult::Wake
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

enum Slot {
    Notify(oneshot::Sender<PollResult>),
    Latch(Arc<AtomicI8>),
}

/// Maps callback-context ids to waiting polls
pub(crate) struct CompletionRegistry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, Slot>>,
}

/// Global registry
static REGISTRY: Lazy<CompletionRegistry> = Lazy::new(CompletionRegistry::new);

pub(crate) fn registry() -> &'static CompletionRegistry {
    &REGISTRY
}

impl CompletionRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, slot: Slot) -> PendingPoll {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(id, slot);
        PendingPoll { id, registry: self }
    }

    /// Register a slot resolved through a oneshot channel
    pub(crate) fn register_notify(&self) -> (PendingPoll<'_>, oneshot::Receiver<PollResult>) {
        let (tx, rx) = oneshot::channel();
        (self.insert(Slot::Notify(tx)), rx)
    }

    /// Register a slot resolved by storing into an atomic latch
    pub(crate) fn register_latch(&self) -> (PendingPoll<'_>, PollLatch) {
        let latch = Arc::new(AtomicI8::new(LATCH_PENDING));
        let pending = self.insert(Slot::Latch(Arc::clone(&latch)));
        (pending, PollLatch(latch))
    }

    fn resolve(&self, id: u64, result: PollResult) {
        // Removed under the lock, signalled after it is released.
        let slot = self.slots.lock().remove(&id);

        match slot {
            Some(Slot::Notify(tx)) => {
                if tx.send(result).is_err() {
                    tracing::debug!(id, "poll result arrived after the waiter left");
                }
            }
            Some(Slot::Latch(latch)) => {
                let raw = match result {
                    PollResult::Ready => POLL_READY,
                    PollResult::Wake => POLL_WAKE,
                };
                latch.store(raw, Ordering::Release);
            }
            None => {
                tracing::debug!(id, ?result, "callback for unknown or retired context ignored");
            }
        }
    }

    fn retire(&self, id: u64) {
        self.slots.lock().remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.slots.lock().contains_key(&id)
    }
}

/// A registered slot; dropping it retires the id
pub(crate) struct PendingPoll<'r> {
    id: u64,
    registry: &'r CompletionRegistry,
}

impl PendingPoll<'_> {
    /// The callback-context id passed to the native poll
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingPoll<'_> {
    fn drop(&mut self) {
        self.registry.retire(self.id);
    }
}

/// Latest poll result stored by the callback, for the timed-retry strategy
pub(crate) struct PollLatch(Arc<AtomicI8>);

impl PollLatch {
    /// The stored result, if the callback has fired
    pub(crate) fn get(&self) -> Option<PollResult> {
        match self.0.load(Ordering::Acquire) {
            LATCH_PENDING => None,
            raw => Some(PollResult::from_raw(raw)),
        }
    }
}

// ============================================================================
// CALLBACK
// ============================================================================

/// The continuation callback passed to every native poll
///
/// Called by the native runtime, possibly on a thread the host has never
/// seen.
pub extern "C" fn continuation_callback(data: u64, poll_result: i8) {
    registry().resolve(data, PollResult::from_raw(poll_result));
}

// ============================================================================
// TESTS
// ============================================================================
