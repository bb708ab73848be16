//! # Tether Core
//!
//! Host-side bridge for calling a precompiled native library through a
//! stable C ABI: synchronous calls, reference-counted objects, and native
//! futures awaited from the host's async runtime.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TETHER CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                          Bindings                                 │  │
//! │  │   SecretKey │ PublicKey │ Wallet │ PaymentOption │ Client        │  │
//! │  └──────────────────────────────┬────────────────────────────────────┘  │
//! │                                 │                                       │
//! │  ┌─────────────┐  ┌─────────────┴─┐  ┌──────────────────────────────┐  │
//! │  │   Codec     │  │    Bridge     │  │           Config             │  │
//! │  │             │  │               │  │                              │  │
//! │  │ - Writer    │  │ - Symbols     │  │ - Library / search paths     │  │
//! │  │ - Reader    │◄─┤ - Calls       │◄─┤ - Namespaces                 │  │
//! │  │ - Encode    │  │ - Futures     │  │ - Async strategy             │  │
//! │  └─────────────┘  └───────┬───────┘  └──────────────────────────────┘  │
//! │                           │                                             │
//! │  ┌────────────────────────┴──────────────────────────────────────────┐  │
//! │  │                            FFI                                    │  │
//! │  │  OwnedBuffer │ CallStatus │ Handle │ NativeFuture │ SymbolSource  │  │
//! │  └────────────────────────┬──────────────────────────────────────────┘  │
//! │                           │                                             │
//! │                           ▼                                             │
//! │               native library (flat C function table)                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Library location, namespaces, async strategy
//! - [`ffi`] - C ABI types, handles, futures, symbol resolution
//! - [`codec`] - Big-endian encoding of compound values
//! - [`bridge`] - The context typed wrappers call through
//! - [`bindings`] - Typed wrappers over native objects
//!
//! ## Example
//!
//! ```no_run
//! use tether_core::bindings::{SecretKey, Wallet};
//! use tether_core::{Bridge, BridgeConfig};
//!
//! # async fn run() -> tether_core::Result<()> {
//! let config = BridgeConfig::from_env()?;
//! // SAFETY: the configured library exports the expected function table.
//! let bridge = unsafe { Bridge::load(&config)? };
//!
//! let key = SecretKey::random(&bridge)?;
//! let wallet = Wallet::from_secret_key(&bridge, &key)?;
//! println!("{} holds {}", wallet.address()?, wallet.balance().await?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod bindings;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod ffi;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bridge::Bridge;
pub use codec::{Decode, Encode, Reader, Writer};
pub use config::{AsyncStrategy, BridgeConfig};
pub use error::{Error, NativeError, Result};
pub use ffi::{CallPointer, ErrorSchema, Handle, NativeFuture, OwnedBuffer};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Tether Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "ios")]
        target: "ios",
        #[cfg(target_os = "android")]
        target: "android",
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(
            target_os = "ios",
            target_os = "android",
            target_os = "macos",
            target_os = "linux",
            target_os = "windows"
        )))]
        target: "unknown",
        pointer_width: usize::BITS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Pointer width in bits; handles cross the boundary as 64-bit values
    pub pointer_width: u32,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================
