//! Wallets and payment options.

use std::fmt;

use super::keys::SecretKey;
use super::{constructor, method, ObjectAsyncFn, ObjectToBufferFn, ObjectToObjectFn};
use crate::bridge::Bridge;
use crate::codec::{Encode, Writer};
use crate::error::Result;
use crate::ffi::{BufferFormat, ErrorSchema, Handle};

/// Errors raised by wallet operations
pub const WALLET_ERROR: ErrorSchema =
    ErrorSchema::new("WalletError", &["InvalidKey", "Network"]);

// ============================================================================
// WALLET
// ============================================================================

/// A native wallet
///
/// Built from a [`SecretKey`], which stays usable afterwards.
pub struct Wallet {
    handle: Handle,
    bridge: Bridge,
}

impl Wallet {
    pub(crate) const TYPE_NAME: &'static str = "wallet";

    /// Create a wallet owned by `key`
    pub fn from_secret_key(bridge: &Bridge, key: &SecretKey) -> Result<Self> {
        let vtable = bridge.handle_vtable(Self::TYPE_NAME)?;
        // SAFETY: `from_secret_key` consumes one key reference.
        let from_key: ObjectToObjectFn =
            unsafe { constructor(bridge, Self::TYPE_NAME, "from_secret_key")? };

        let key = key.handle().for_call()?;
        let handle = bridge.call_object(vtable, Some(&WALLET_ERROR), |status| unsafe {
            from_key(key.into_raw(), status)
        })?;
        Ok(Self {
            handle,
            bridge: bridge.clone(),
        })
    }

    /// Hex address of the wallet
    pub fn address(&self) -> Result<String> {
        // SAFETY: `address` consumes `this` and returns a raw UTF-8 buffer.
        let address: ObjectToBufferFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "address")? };

        let this = self.handle.for_call()?;
        self.bridge
            .call_buffer(Some(&WALLET_ERROR), |status| unsafe {
                address(this.into_raw(), status)
            })?
            .into_string(BufferFormat::Raw)
    }

    /// Token balance, fetched from the network
    pub async fn balance(&self) -> Result<i64> {
        // SAFETY: `balance` consumes `this` and starts an i64 future.
        let balance: ObjectAsyncFn =
            unsafe { method(&self.bridge, Self::TYPE_NAME, "balance")? };

        let this = self.handle.for_call()?;
        let start = move || Ok(unsafe { balance(this.into_raw()) });
        // SAFETY: `balance` produces an i64 future.
        unsafe { self.bridge.call_async::<i64>(Some(&WALLET_ERROR), start) }.await
    }

    /// A second wallet sharing the same native object
    pub fn duplicate(&self) -> Result<Self> {
        Ok(Self {
            handle: self.handle.duplicate()?,
            bridge: self.bridge.clone(),
        })
    }

    /// Release the native wallet
    pub fn dispose(&mut self) {
        self.handle.dispose();
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PAYMENT OPTION
// ============================================================================

/// How an upload is paid for
///
/// Wire layout: variant index (1 = wallet, 2 = receipt) followed by the
/// wallet reference or the receipt string.
#[derive(Debug)]
pub enum PaymentOption<'a> {
    /// Pay from a wallet; the native side receives its own reference
    Wallet(&'a Wallet),
    /// Reuse a receipt from an earlier payment
    Receipt(String),
}

impl Encode for PaymentOption<'_> {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        match self {
            PaymentOption::Wallet(wallet) => {
                writer.write_variant(1);
                writer.write_handle(wallet.handle().for_call()?);
            }
            PaymentOption::Receipt(receipt) => {
                writer.write_variant(2);
                writer.write_str(receipt)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
