//! Typed entry points of the mock library.
//!
//! Mirrors the contract of a real generated library: argument buffers and
//! object references passed in are consumed, errors are written to the call
//! status as `[variant, message]`, async entry points return a future handle.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{
    alloc_buffer, consume_object, fail, new_object, object, spawn_future, structured_error,
    take_buffer, Delivery, Outcome,
};
use crate::codec::{self, Reader, Writer};
use crate::ffi::{
    BufferFormat, CallStatus, FutureHandle, OwnedBuffer, StaticSymbols, SymbolNames,
};

/// Object types with clone/free entry points
pub(crate) const OBJECT_TYPES: [&str; 4] = ["secretkey", "publickey", "wallet", "client"];

/// Status code for a typed error
const CALL_ERROR: i8 = 2;

/// Wake-ups each mock network operation reports before it is ready
const NETWORK_WAKES: u32 = 2;

/// Balance reported for every wallet
pub(crate) const WALLET_BALANCE: i64 = 1_000_000;

/// Version string of the mock library
pub(crate) const NATIVE_VERSION: &str = "mock-native 0.9.1";

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
static STORE: Lazy<Mutex<HashMap<String, Vec<u8>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Register every typed entry point under its conventional name
pub(crate) fn register(names: &SymbolNames, table: &mut StaticSymbols) {
    table
        .insert(names.constructor("secretkey", "random"), secretkey_random as usize)
        .insert(names.constructor("secretkey", "from_hex"), secretkey_from_hex as usize)
        .insert(names.method("secretkey", "to_hex"), secretkey_to_hex as usize)
        .insert(names.method("secretkey", "public_key"), secretkey_public_key as usize)
        .insert(names.method("publickey", "to_hex"), publickey_to_hex as usize)
        .insert(names.constructor("wallet", "from_secret_key"), wallet_from_secret_key as usize)
        .insert(names.method("wallet", "address"), wallet_address as usize)
        .insert(names.method("wallet", "balance"), wallet_balance as usize)
        .insert(names.constructor("client", "connect"), client_connect as usize)
        .insert(names.method("client", "data_put"), client_data_put as usize)
        .insert(names.method("client", "data_get"), client_data_get as usize)
        .insert(names.method("client", "shutdown"), client_shutdown as usize)
        .insert(names.function("version"), version as usize);
}

// ============================================================================
// KEYS
// ============================================================================

fn next_key() -> Vec<u8> {
    let seed = NEXT_KEY.fetch_add(1, Ordering::SeqCst).to_be_bytes();
    seed.iter().cycle().take(32).copied().collect()
}

/// A public key is the reversed secret key
fn derive_public(secret: &[u8]) -> Vec<u8> {
    secret.iter().rev().copied().collect()
}

unsafe extern "C" fn secretkey_random(_status: *mut CallStatus) -> *mut c_void {
    new_object("secretkey", next_key())
}

unsafe extern "C" fn secretkey_from_hex(
    encoded: OwnedBuffer,
    status: *mut CallStatus,
) -> *mut c_void {
    let text = take_buffer(encoded);
    let bytes = match std::str::from_utf8(&text).ok().and_then(|t| hex::decode(t).ok()) {
        Some(bytes) => bytes,
        None => {
            fail(status, CALL_ERROR, &structured_error(1, "not a hex string"));
            return std::ptr::null_mut();
        }
    };

    if bytes.len() != 32 {
        let message = format!("expected 32 bytes, got {}", bytes.len());
        fail(status, CALL_ERROR, &structured_error(2, &message));
        return std::ptr::null_mut();
    }

    new_object("secretkey", bytes)
}

unsafe extern "C" fn secretkey_to_hex(this: *mut c_void, _status: *mut CallStatus) -> OwnedBuffer {
    let encoded = hex::encode(&object(this).payload);
    consume_object(this);
    alloc_buffer(encoded.as_bytes())
}

unsafe extern "C" fn secretkey_public_key(
    this: *mut c_void,
    _status: *mut CallStatus,
) -> *mut c_void {
    let public = derive_public(&object(this).payload);
    consume_object(this);
    new_object("publickey", public)
}

unsafe extern "C" fn publickey_to_hex(this: *mut c_void, _status: *mut CallStatus) -> OwnedBuffer {
    let encoded = hex::encode(&object(this).payload);
    consume_object(this);
    alloc_buffer(encoded.as_bytes())
}

// ============================================================================
// WALLET
// ============================================================================

unsafe extern "C" fn wallet_from_secret_key(
    key: *mut c_void,
    _status: *mut CallStatus,
) -> *mut c_void {
    let address = derive_public(&object(key).payload);
    consume_object(key);
    new_object("wallet", address)
}

unsafe extern "C" fn wallet_address(this: *mut c_void, _status: *mut CallStatus) -> OwnedBuffer {
    let address = format!("0x{}", hex::encode(&object(this).payload[..20]));
    consume_object(this);
    alloc_buffer(address.as_bytes())
}

unsafe extern "C" fn wallet_balance(this: *mut c_void) -> FutureHandle {
    consume_object(this);
    spawn_future(NETWORK_WAKES, Delivery::Thread, Outcome::I64(WALLET_BALANCE))
}

// ============================================================================
// CLIENT
// ============================================================================

fn network_error(variant: i32, message: &str) -> Outcome {
    Outcome::Error {
        code: CALL_ERROR,
        payload: structured_error(variant, message),
    }
}

unsafe extern "C" fn client_connect(peers: OwnedBuffer) -> FutureHandle {
    let outcome = match codec::decode_from_slice::<Vec<String>>(&take_buffer(peers)) {
        Ok(peers) if !peers.is_empty() => {
            let mut payload = Vec::new();
            for peer in &peers {
                payload.extend_from_slice(peer.as_bytes());
            }
            Outcome::Pointer(new_object("client", payload) as usize)
        }
        Ok(_) => network_error(1, "no bootstrap peers"),
        Err(_) => network_error(1, "malformed peer list"),
    };
    spawn_future(NETWORK_WAKES, Delivery::Thread, outcome)
}

/// Read a payment option: 1 = wallet reference, 2 = receipt string
unsafe fn take_payment(bytes: &[u8]) -> Result<(), String> {
    let mut reader = Reader::new(bytes);
    match reader.read_variant() {
        Ok(1) => {
            let wallet = reader.read_pointer().map_err(|e| e.to_string())? as *mut c_void;
            consume_object(wallet);
            Ok(())
        }
        Ok(2) => reader.read_string().map(|_| ()).map_err(|e| e.to_string()),
        Ok(other) => Err(format!("unknown payment variant {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

unsafe extern "C" fn client_data_put(
    this: *mut c_void,
    data: OwnedBuffer,
    payment: OwnedBuffer,
) -> FutureHandle {
    consume_object(this);
    let data = take_buffer(data);
    let payment = take_buffer(payment);

    let framed = BufferFormat::LengthPrefixed.unwrap(&data);
    let outcome = match (framed, take_payment(&payment)) {
        (Ok(content), Ok(_)) => {
            let address = hex::encode(derive_public(&content));
            let chunks = (content.len() as u64).div_ceil(4).max(1);
            STORE.lock().insert(address.clone(), content);

            let mut writer = Writer::new();
            let _ = writer.write_str(&address);
            writer.write_u64(chunks);
            writer.write_u64(chunks * 10);
            Outcome::Buffer(writer.finish())
        }
        (Err(e), _) => network_error(2, &e.to_string()),
        (_, Err(message)) => network_error(2, &message),
    };
    spawn_future(NETWORK_WAKES, Delivery::Thread, outcome)
}

unsafe extern "C" fn client_data_get(this: *mut c_void, address: OwnedBuffer) -> FutureHandle {
    consume_object(this);
    let address = String::from_utf8_lossy(&take_buffer(address)).into_owned();

    let outcome = match STORE.lock().get(&address) {
        Some(content) => match BufferFormat::LengthPrefixed.wrap(content) {
            Ok(framed) => Outcome::Buffer(framed),
            Err(e) => network_error(1, &e.to_string()),
        },
        None => network_error(3, &format!("no data at {}", address)),
    };
    spawn_future(NETWORK_WAKES, Delivery::Thread, outcome)
}

unsafe extern "C" fn client_shutdown(this: *mut c_void) -> FutureHandle {
    consume_object(this);
    spawn_future(0, Delivery::Inline, Outcome::Void)
}

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

unsafe extern "C" fn version(_status: *mut CallStatus) -> OwnedBuffer {
    alloc_buffer(NATIVE_VERSION.as_bytes())
}
