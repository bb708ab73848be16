//! # Bridge Demo
//!
//! Loads a native library through the bridge and exercises one wrapper of
//! each kind: a synchronous object, an object built from another handle,
//! and async calls.
//!
//! ## Run
//!
//! ```bash
//! TETHER_LIBRARY=/path/to/libant_ffi.so TETHER_NAMESPACE=uniffi_ant_ffi \
//!     cargo run --example bridge_demo
//! ```

use tether_core::bindings::{self, Client, PaymentOption, SecretKey, Wallet};
use tether_core::{Bridge, BridgeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_core=debug".into()),
        )
        .init();

    let info = tether_core::build_info();
    println!("=== Tether Core v{}: Bridge Demo ===", info.version);
    println!(
        "    target {} ({}-bit, {})\n",
        info.target, info.pointer_width, info.profile
    );

    // Step 1: Configuration
    println!("Step 1: Reading configuration from the environment...");
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("  Invalid configuration: {}", e);
            return;
        }
    };
    println!("  Library:    {}", config.library);
    println!("  Namespace:  {}", config.namespace);
    println!("  Strategy:   {:?}", config.strategy);
    println!();

    // Step 2: Load the library
    println!("Step 2: Loading the native library...");
    // SAFETY: the configured library is expected to export the function
    // table named by the configured namespaces.
    let bridge = match unsafe { Bridge::load(&config) } {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("  Could not load the library: {} (code {})", e, e.code());
            eprintln!("  Set TETHER_LIBRARY to a compiled native library to continue.");
            return;
        }
    };
    println!("  Loaded: {:?}", bridge);
    println!();

    if let Err(e) = run(&bridge).await {
        eprintln!("\nDemo failed: {} (code {})", e, e.code());
    }
}

async fn run(bridge: &Bridge) -> tether_core::Result<()> {
    // Step 3: Synchronous objects
    println!("Step 3: Keys (synchronous calls)...");
    if let Ok(version) = bindings::native_version(bridge) {
        println!("  Native version: {}", version);
    }
    let key = SecretKey::random(bridge)?;
    println!("  Secret key: {}...", preview(&key.to_hex()?));
    println!("  Public key: {}...", preview(&key.public_key()?.to_hex()?));
    println!();

    // Step 4: Objects built from other handles
    println!("Step 4: Wallet (constructed from the key handle)...");
    let wallet = Wallet::from_secret_key(bridge, &key)?;
    println!("  Address: {}", wallet.address()?);
    println!("  Balance: {}", wallet.balance().await?);
    println!();

    // Step 5: Async objects
    println!("Step 5: Client (async constructor and methods)...");
    let peers: Vec<String> = std::env::var("TETHER_DEMO_PEERS")
        .map(|v| v.split(',').map(str::to_owned).collect())
        .unwrap_or_default();
    let client = Client::connect(bridge, &peers).await?;

    let receipt = client
        .data_put(b"hello from tether", &PaymentOption::Wallet(&wallet))
        .await?;
    println!(
        "  Stored at {} ({} chunks, cost {})",
        receipt.address, receipt.chunks, receipt.cost
    );

    let content = client.data_get(&receipt.address).await?;
    println!("  Fetched back: {}", String::from_utf8_lossy(&content));

    client.shutdown().await?;
    println!();
    println!("=== Demo complete ===");
    Ok(())
}

/// First 16 characters of a hex string, or all of it if shorter
fn preview(hex: &str) -> &str {
    hex.get(..16).unwrap_or(hex)
}
