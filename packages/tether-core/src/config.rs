//! Bridge configuration.
//!
//! Where the native library lives, which symbol namespaces it uses, and how
//! native futures are awaited. Loaded from environment variables or JSON.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default library name, resolved with platform naming
pub const DEFAULT_LIBRARY: &str = "tether_native";

/// Default symbol namespace
pub const DEFAULT_NAMESPACE: &str = "tether";

/// Default timed-retry interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

/// Default timed-retry ceiling (one minute at the default interval)
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 12_000;

/// How the host waits for native poll callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AsyncStrategy {
    /// Await a completion slot resolved by the callback
    Callback {
        /// Yield to the scheduler before re-polling after a wake
        #[serde(default = "default_yield")]
        yield_between_polls: bool,
    },
    /// Check a latch written by the callback at a fixed interval
    TimedRetry {
        /// Milliseconds between checks
        #[serde(default = "default_interval")]
        interval_ms: u64,
        /// Checks before giving up with a timeout
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
}

fn default_yield() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

impl Default for AsyncStrategy {
    fn default() -> Self {
        AsyncStrategy::Callback {
            yield_between_polls: true,
        }
    }
}

impl AsyncStrategy {
    /// Timed retry with the default interval and ceiling
    pub fn timed_retry() -> Self {
        AsyncStrategy::TimedRetry {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Library path, or a bare name resolved on the search paths
    pub library: String,
    /// Extra directories searched before the platform defaults
    pub search_paths: Vec<PathBuf>,
    /// Prefix of the `_fn_` entry points
    pub namespace: String,
    /// Prefix of the buffer and future entry points; defaults to `namespace`
    pub ffi_namespace: Option<String>,
    /// Async waiting strategy
    pub strategy: AsyncStrategy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library: DEFAULT_LIBRARY.to_string(),
            search_paths: Vec::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ffi_namespace: None,
            strategy: AsyncStrategy::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                   | Field                                |
    /// |----------------------------|--------------------------------------|
    /// | `TETHER_LIBRARY`           | `library`                            |
    /// | `TETHER_SEARCH_PATH`       | `search_paths` (platform path list)  |
    /// | `TETHER_NAMESPACE`         | `namespace`                          |
    /// | `TETHER_FFI_NAMESPACE`     | `ffi_namespace`                      |
    /// | `TETHER_ASYNC_STRATEGY`    | `callback` or `timed_retry`          |
    /// | `TETHER_POLL_INTERVAL_MS`  | timed retry interval                 |
    /// | `TETHER_MAX_POLL_ATTEMPTS` | timed retry ceiling                  |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let search_paths = lookup("TETHER_SEARCH_PATH")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();

        let strategy = match lookup("TETHER_ASYNC_STRATEGY").as_deref() {
            None | Some("callback") => AsyncStrategy::default(),
            Some("timed_retry") => AsyncStrategy::TimedRetry {
                interval_ms: parse_var(&lookup, "TETHER_POLL_INTERVAL_MS")?
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                max_attempts: parse_var(&lookup, "TETHER_MAX_POLL_ATTEMPTS")?
                    .unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS),
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "TETHER_ASYNC_STRATEGY must be 'callback' or 'timed_retry', got '{}'",
                    other
                )))
            }
        };

        let config = Self {
            library: lookup("TETHER_LIBRARY").unwrap_or(defaults.library),
            search_paths,
            namespace: lookup("TETHER_NAMESPACE").unwrap_or(defaults.namespace),
            ffi_namespace: lookup("TETHER_FFI_NAMESPACE"),
            strategy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The namespace of buffer and future entry points
    pub fn ffi_namespace(&self) -> &str {
        self.ffi_namespace.as_deref().unwrap_or(&self.namespace)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.library.trim().is_empty() {
            return Err(Error::Config("library must not be empty".into()));
        }
        if !is_symbol_prefix(&self.namespace) {
            return Err(Error::Config(format!(
                "namespace '{}' is not a valid symbol prefix",
                self.namespace
            )));
        }
        if let Some(ffi) = &self.ffi_namespace {
            if !is_symbol_prefix(ffi) {
                return Err(Error::Config(format!(
                    "ffi_namespace '{}' is not a valid symbol prefix",
                    ffi
                )));
            }
        }
        if let AsyncStrategy::TimedRetry {
            interval_ms,
            max_attempts,
        } = self.strategy
        {
            if interval_ms == 0 {
                return Err(Error::Config("interval_ms must be greater than 0".into()));
            }
            if max_attempts == 0 {
                return Err(Error::Config("max_attempts must be greater than 0".into()));
            }
        }
        Ok(())
    }
}

fn is_symbol_prefix(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid number: '{}'", key, raw))),
    }
}
