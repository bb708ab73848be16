//! In-process mock of a native library.
//!
//! Implements the C function table with `extern "C"` functions so tests can
//! drive the real bridge code end to end. Buffers and objects are leaked
//! instead of deallocated, so their addresses are never reused and can be
//! used as identities in assertions.

mod api;

pub(crate) use api::{NATIVE_VERSION, WALLET_BALANCE};

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::bridge::Bridge;
use crate::codec::Writer;
use crate::config::{AsyncStrategy, BridgeConfig};
use crate::ffi::{
    BufferVTable, CallStatus, ContinuationFn, FutureCompleteFn, FutureHandle, FutureOp,
    FutureResult, FutureVTable, ForeignBytes, HandleVTable, OwnedBuffer, ResultShape,
    StaticSymbols, SymbolNames, POLL_READY, POLL_WAKE,
};

pub(crate) const NAMESPACE: &str = "mock";
pub(crate) const FFI_NAMESPACE: &str = "mock_ffi";

// ============================================================================
// BUFFERS
// ============================================================================

static LIVE_BUFFERS: Lazy<Mutex<HashSet<usize>>> = Lazy::new(|| Mutex::new(HashSet::new()));
static BUFFER_FREES: Lazy<Mutex<HashMap<usize, u32>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Allocate a "native" buffer holding a copy of `bytes`
pub(crate) fn alloc_buffer(bytes: &[u8]) -> OwnedBuffer {
    if bytes.is_empty() {
        return OwnedBuffer::empty();
    }
    let leaked: &'static mut [u8] = Box::leak(bytes.to_vec().into_boxed_slice());
    let buffer = OwnedBuffer {
        capacity: leaked.len() as u64,
        len: leaked.len() as u64,
        data: leaked.as_mut_ptr(),
    };
    LIVE_BUFFERS.lock().insert(buffer.data as usize);
    buffer
}

/// Whether the buffer at `addr` is allocated and not yet freed
pub(crate) fn is_live(addr: usize) -> bool {
    LIVE_BUFFERS.lock().contains(&addr)
}

/// How many times the buffer at `addr` was passed to the free entry point
pub(crate) fn free_count(addr: usize) -> u32 {
    BUFFER_FREES.lock().get(&addr).copied().unwrap_or(0)
}

/// Copy an argument buffer and free it, as a native callee does
pub(crate) fn take_buffer(buffer: OwnedBuffer) -> Vec<u8> {
    let bytes = unsafe { buffer.as_slice() }.to_vec();
    release_buffer(&buffer);
    bytes
}

fn release_buffer(buffer: &OwnedBuffer) {
    if buffer.data.is_null() {
        return;
    }
    let addr = buffer.data as usize;
    LIVE_BUFFERS.lock().remove(&addr);
    *BUFFER_FREES.lock().entry(addr).or_insert(0) += 1;
}

unsafe extern "C" fn rustbuffer_from_bytes(
    bytes: ForeignBytes<'_>,
    _status: *mut CallStatus,
) -> OwnedBuffer {
    alloc_buffer(bytes.as_slice())
}

unsafe extern "C" fn rustbuffer_free(buffer: OwnedBuffer, _status: *mut CallStatus) {
    release_buffer(&buffer);
}

/// Buffer entry points of the mock library
pub(crate) fn buffer_vtable() -> BufferVTable {
    unsafe { BufferVTable::new(rustbuffer_from_bytes, rustbuffer_free) }
}

/// Mark a call as failed with a serialized error
pub(crate) unsafe fn fail(status: *mut CallStatus, code: i8, payload: &[u8]) {
    (*status).code = code;
    (*status).error_buf = alloc_buffer(payload);
}

/// Encode `[variant, message]` the way native error enums are serialized
pub(crate) fn structured_error(variant: i32, message: &str) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_variant(variant);
    let _ = writer.write_str(message);
    writer.finish()
}

// ============================================================================
// OBJECTS
// ============================================================================

/// A reference-counted native object
pub(crate) struct MockObject {
    pub(crate) kind: &'static str,
    pub(crate) payload: Vec<u8>,
    refs: AtomicI64,
    clones: AtomicU32,
    frees: AtomicU32,
}

/// Create an object holding one reference
pub(crate) fn new_object(kind: &'static str, payload: Vec<u8>) -> *mut c_void {
    let object = Box::new(MockObject {
        kind,
        payload,
        refs: AtomicI64::new(1),
        clones: AtomicU32::new(0),
        frees: AtomicU32::new(0),
    });
    Box::into_raw(object) as *mut c_void
}

/// Look at an object. Objects are never deallocated.
pub(crate) unsafe fn object<'a>(ptr: *const c_void) -> &'a MockObject {
    &*(ptr as *const MockObject)
}

/// Type name the object at `addr` was created with
pub(crate) fn object_kind(addr: usize) -> &'static str {
    unsafe { object(addr as *const c_void) }.kind
}

/// Current reference count of the object at `addr`
pub(crate) fn object_refs(addr: usize) -> i64 {
    unsafe { object(addr as *const c_void) }.refs.load(Ordering::SeqCst)
}

/// How many times the object at `addr` was cloned
pub(crate) fn object_clones(addr: usize) -> u32 {
    unsafe { object(addr as *const c_void) }.clones.load(Ordering::SeqCst)
}

/// How many times the free entry point was called for the object at `addr`
pub(crate) fn object_frees(addr: usize) -> u32 {
    unsafe { object(addr as *const c_void) }.frees.load(Ordering::SeqCst)
}

/// Drop the reference a native call was given
pub(crate) unsafe fn consume_object(ptr: *mut c_void) {
    object(ptr).refs.fetch_sub(1, Ordering::SeqCst);
}

unsafe extern "C" fn object_clone(ptr: *mut c_void, _status: *mut CallStatus) -> *mut c_void {
    let obj = object(ptr);
    obj.refs.fetch_add(1, Ordering::SeqCst);
    obj.clones.fetch_add(1, Ordering::SeqCst);
    ptr
}

unsafe extern "C" fn object_free(ptr: *mut c_void, _status: *mut CallStatus) {
    let obj = object(ptr);
    obj.refs.fetch_sub(1, Ordering::SeqCst);
    obj.frees.fetch_add(1, Ordering::SeqCst);
}

/// Clone/free entry points for a mock object type
pub(crate) fn handle_vtable(kind: &'static str) -> HandleVTable {
    unsafe { HandleVTable::new(kind, object_clone, object_free, buffer_vtable()) }
}

// ============================================================================
// FUTURES
// ============================================================================

/// How a mock future delivers poll results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Call the continuation before `poll` returns
    Inline,
    /// Call the continuation from a fresh thread
    Thread,
    /// Never call the continuation
    Never,
}

/// What `complete` hands back
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    I64(i64),
    Pointer(usize),
    Buffer(Vec<u8>),
    Void,
    Error { code: i8, payload: Vec<u8> },
}

struct MockFuture {
    wakes: u32,
    polls: u32,
    delivery: Delivery,
    outcome: Option<Outcome>,
    events: Vec<&'static str>,
    error_buffer: Option<usize>,
    returned_buffer: Option<usize>,
}

static FUTURES: Lazy<Mutex<HashMap<FutureHandle, MockFuture>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_FUTURE: AtomicU64 = AtomicU64::new(0x1000);

/// Start a future that reports `wakes` wake-ups before it is ready
pub(crate) fn spawn_future(wakes: u32, delivery: Delivery, outcome: Outcome) -> FutureHandle {
    let handle = NEXT_FUTURE.fetch_add(1, Ordering::SeqCst);
    FUTURES.lock().insert(
        handle,
        MockFuture {
            wakes,
            polls: 0,
            delivery,
            outcome: Some(outcome),
            events: Vec::new(),
            error_buffer: None,
            returned_buffer: None,
        },
    );
    handle
}

/// Entry points called on a future, in order
pub(crate) fn future_events(handle: FutureHandle) -> Vec<&'static str> {
    FUTURES
        .lock()
        .get(&handle)
        .map(|f| f.events.clone())
        .unwrap_or_default()
}

/// Number of polls a future received
pub(crate) fn future_polls(handle: FutureHandle) -> u32 {
    FUTURES.lock().get(&handle).map_or(0, |f| f.polls)
}

/// Address of the error buffer a failed future handed out
pub(crate) fn future_error_buffer(handle: FutureHandle) -> Option<usize> {
    FUTURES.lock().get(&handle).and_then(|f| f.error_buffer)
}

/// Address of the result buffer a failed future handed out anyway
pub(crate) fn future_returned_buffer(handle: FutureHandle) -> Option<usize> {
    FUTURES.lock().get(&handle).and_then(|f| f.returned_buffer)
}

fn record(handle: FutureHandle, event: &'static str) {
    if let Some(future) = FUTURES.lock().get_mut(&handle) {
        future.events.push(event);
    }
}

unsafe extern "C" fn future_poll(handle: FutureHandle, callback: ContinuationFn, data: u64) {
    let step = {
        let mut futures = FUTURES.lock();
        futures.get_mut(&handle).map(|future| {
            future.events.push("poll");
            future.polls += 1;
            let result = if future.polls > future.wakes {
                POLL_READY
            } else {
                POLL_WAKE
            };
            (result, future.delivery)
        })
    };

    match step {
        Some((result, Delivery::Inline)) => callback(data, result),
        Some((result, Delivery::Thread)) => {
            std::thread::spawn(move || callback(data, result));
        }
        Some((_, Delivery::Never)) | None => {}
    }
}

/// Record a completion and take the outcome; errors are written to `status`
unsafe fn take_outcome(handle: FutureHandle, status: *mut CallStatus) -> Option<Outcome> {
    let mut futures = FUTURES.lock();
    let future = futures.get_mut(&handle)?;
    future.events.push("complete");

    match future.outcome.take() {
        Some(Outcome::Error { code, payload }) => {
            let buffer = alloc_buffer(&payload);
            future.error_buffer = Some(buffer.data as usize);
            (*status).code = code;
            (*status).error_buf = buffer;
            None
        }
        other => other,
    }
}

unsafe extern "C" fn future_complete_i64(handle: FutureHandle, status: *mut CallStatus) -> i64 {
    match take_outcome(handle, status) {
        Some(Outcome::I64(value)) => value,
        _ => 0,
    }
}

unsafe extern "C" fn future_complete_pointer(
    handle: FutureHandle,
    status: *mut CallStatus,
) -> *mut c_void {
    match take_outcome(handle, status) {
        Some(Outcome::Pointer(addr)) => addr as *mut c_void,
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn future_complete_void(handle: FutureHandle, status: *mut CallStatus) {
    let _ = take_outcome(handle, status);
}

unsafe extern "C" fn future_complete_rust_buffer(
    handle: FutureHandle,
    status: *mut CallStatus,
) -> OwnedBuffer {
    match take_outcome(handle, status) {
        Some(Outcome::Buffer(bytes)) => alloc_buffer(&bytes),
        _ if (*status).code != 0 => {
            let junk = alloc_buffer(b"partial result");
            if let Some(future) = FUTURES.lock().get_mut(&handle) {
                future.returned_buffer = Some(junk.data as usize);
            }
            junk
        }
        _ => OwnedBuffer::empty(),
    }
}

unsafe extern "C" fn future_free(handle: FutureHandle) {
    record(handle, "free");
}

unsafe extern "C" fn future_cancel(handle: FutureHandle) {
    record(handle, "cancel");
}

/// Result shapes the mock can complete
pub(crate) trait MockShape: FutureResult {
    const COMPLETE: FutureCompleteFn<Self>;
}

impl MockShape for i64 {
    const COMPLETE: FutureCompleteFn<Self> = future_complete_i64;
}

impl MockShape for *mut c_void {
    const COMPLETE: FutureCompleteFn<Self> = future_complete_pointer;
}

impl MockShape for () {
    const COMPLETE: FutureCompleteFn<Self> = future_complete_void;
}

impl MockShape for OwnedBuffer {
    const COMPLETE: FutureCompleteFn<Self> = future_complete_rust_buffer;
}

/// Future entry points for one shape
pub(crate) fn future_vtable<T: MockShape>() -> FutureVTable<T> {
    unsafe { FutureVTable::new(future_poll, T::COMPLETE, future_free, future_cancel) }
}

// ============================================================================
// SYMBOL TABLE
// ============================================================================

/// The full mock function table
pub(crate) fn symbols() -> StaticSymbols {
    let names = SymbolNames::new(NAMESPACE, FFI_NAMESPACE);
    let mut table = StaticSymbols::new("mock native library");

    table
        .insert(names.buffer_from_bytes(), rustbuffer_from_bytes as usize)
        .insert(names.buffer_free(), rustbuffer_free as usize);

    let completes = [
        (ResultShape::Pointer, future_complete_pointer as usize),
        (ResultShape::Buffer, future_complete_rust_buffer as usize),
        (ResultShape::Void, future_complete_void as usize),
        (ResultShape::I64, future_complete_i64 as usize),
    ];
    for (shape, complete) in completes {
        table
            .insert(names.future(FutureOp::Poll, shape), future_poll as usize)
            .insert(names.future(FutureOp::Complete, shape), complete)
            .insert(names.future(FutureOp::Free, shape), future_free as usize)
            .insert(names.future(FutureOp::Cancel, shape), future_cancel as usize);
    }

    for kind in api::OBJECT_TYPES {
        table
            .insert(names.clone_fn(kind), object_clone as usize)
            .insert(names.free_fn(kind), object_free as usize);
    }

    api::register(&names, &mut table);
    table
}

/// A bridge over the mock library
pub(crate) fn bridge(strategy: AsyncStrategy) -> Bridge {
    let config = BridgeConfig {
        library: "mock".into(),
        namespace: NAMESPACE.into(),
        ffi_namespace: Some(FFI_NAMESPACE.into()),
        strategy,
        ..BridgeConfig::default()
    };
    unsafe { Bridge::from_source(&config, symbols()) }.expect("mock bridge")
}
