//! Network client.
//!
//! Every operation is asynchronous. Between them they cover the four
//! future result shapes:
//!
//! | Operation  | Shape     | Result                        |
//! |------------|-----------|-------------------------------|
//! | `connect`  | pointer   | new client object             |
//! | `data_put` | buffer    | encoded [`UploadReceipt`]     |
//! | `data_get` | buffer    | length-prefixed bytes         |
//! | `shutdown` | void      | nothing                       |
//!
//! Wallet balances use the i64 shape.

use std::ffi::c_void;
use std::fmt;

use super::wallet::PaymentOption;
use super::{constructor, method, ObjectAsyncFn, ObjectBufferAsyncFn};
use crate::bridge::Bridge;
use crate::codec::{self, Decode, Encode, Reader, Writer};
use crate::error::Result;
use crate::ffi::{ErrorSchema, FutureHandle, Handle, OwnedBuffer};

/// Errors raised by client operations
pub const CLIENT_ERROR: ErrorSchema =
    ErrorSchema::new("ClientError", &["Network", "Payment", "NotFound"]);

type ConnectFn = unsafe extern "C" fn(peers: OwnedBuffer) -> FutureHandle;

type DataPutFn = unsafe extern "C" fn(
    this: *mut c_void,
    data: OwnedBuffer,
    payment: OwnedBuffer,
) -> FutureHandle;

// ============================================================================
// UPLOAD RECEIPT
// ============================================================================

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Hex address the data can be fetched from
    pub address: String,
    /// Number of chunks stored
    pub chunks: u64,
    /// Amount paid
    pub cost: u64,
}

impl Encode for UploadReceipt {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_str(&self.address)?;
        writer.write_u64(self.chunks);
        writer.write_u64(self.cost);
        Ok(())
    }
}

impl Decode for UploadReceipt {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            address: reader.read_string()?,
            chunks: reader.read_u64()?,
            cost: reader.read_u64()?,
        })
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// A connection to the storage network
pub struct Client {
    handle: Handle,
    bridge: Bridge,
}

impl Client {
    pub(crate) const TYPE_NAME: &'static str = "client";

    /// Connect through the given bootstrap peers
    pub async fn connect(bridge: &Bridge, peers: &[String]) -> Result<Self> {
        let vtable = bridge.handle_vtable(Self::TYPE_NAME)?;
        // SAFETY: `connect` consumes an encoded `Vec<String>`.
        let connect: ConnectFn = unsafe { constructor(bridge, Self::TYPE_NAME, "connect")? };

        let start = || -> Result<FutureHandle> {
            let peers = bridge.buffers().lower(&codec::encode_to_vec(peers)?)?;
            Ok(unsafe { connect(peers) })
        };
        // SAFETY: `connect` produces a pointer future.
        let ptr: *mut c_void =
            unsafe { bridge.call_async(Some(&CLIENT_ERROR), start) }.await?;

        tracing::debug!(peers = peers.len(), "client connected");
        Ok(Self {
            // SAFETY: a completed pointer future hands over one reference.
            handle: unsafe { Handle::wrap(ptr, vtable)? },
            bridge: bridge.clone(),
        })
    }

    /// Store `data`, paid for by `payment`
    pub async fn data_put(
        &self,
        data: &[u8],
        payment: &PaymentOption<'_>,
    ) -> Result<UploadReceipt> {
        // SAFETY: `data_put` consumes `this` and two buffers.
        let data_put: DataPutFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "data_put")? };

        let buffers = self.bridge.buffers();
        let start = || -> Result<FutureHandle> {
            let this = self.handle.for_call()?;
            let data = buffers.guard(buffers.lower_prefixed(data)?);

            let mut writer = Writer::new();
            payment.encode(&mut writer)?;
            let payment = buffers.lower_encoded(writer)?;

            Ok(unsafe { data_put(this.into_raw(), data.into_raw(), payment) })
        };

        // SAFETY: `data_put` produces a buffer future.
        let receipt: OwnedBuffer =
            unsafe { self.bridge.call_async(Some(&CLIENT_ERROR), start) }.await?;
        codec::decode_from_slice(&buffers.lift(receipt))
    }

    /// Fetch the data stored at `address`
    pub async fn data_get(&self, address: &str) -> Result<Vec<u8>> {
        // SAFETY: `data_get` consumes `this` and a raw UTF-8 buffer.
        let data_get: ObjectBufferAsyncFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "data_get")? };

        let buffers = self.bridge.buffers();
        let start = || -> Result<FutureHandle> {
            let this = self.handle.for_call()?;
            let address = buffers.lower_str(address)?;
            Ok(unsafe { data_get(this.into_raw(), address) })
        };

        // SAFETY: `data_get` produces a buffer future.
        let content: OwnedBuffer =
            unsafe { self.bridge.call_async(Some(&CLIENT_ERROR), start) }.await?;
        buffers.lift_prefixed_bytes(content)
    }

    /// Close the connection on the native side
    ///
    /// The handle itself is released by [`Client::dispose`] or on drop.
    pub async fn shutdown(&self) -> Result<()> {
        // SAFETY: `shutdown` consumes `this` and starts a void future.
        let shutdown: ObjectAsyncFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "shutdown")? };

        let this = self.handle.for_call()?;
        let start = move || Ok(unsafe { shutdown(this.into_raw()) });
        // SAFETY: `shutdown` produces a void future.
        unsafe { self.bridge.call_async::<()>(Some(&CLIENT_ERROR), start) }.await
    }

    /// Release the native client
    pub fn dispose(&mut self) {
        self.handle.dispose();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
