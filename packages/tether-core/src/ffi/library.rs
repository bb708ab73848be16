//! # Symbol Resolution
//!
//! Finding the flat C function table of the native library.
//!
//! ## Naming Convention
//!
//! ```text
//! <ns>_fn_constructor_<type>_<member>       synchronous constructor
//! <ns>_fn_method_<type>_<member>            method (first argument: object)
//! <ns>_fn_clone_<type> / <ns>_fn_free_<type> reference counting
//! <ns>_fn_func_<name>                       free function
//! <ffi_ns>_rust_future_<op>_<shape>         op: poll | complete | free | cancel
//! <ffi_ns>_rustbuffer_<from_bytes|free>     buffer management
//! ```
//!
//! ## Sources
//!
//! | Source           | Backing                                   |
//! |------------------|-------------------------------------------|
//! | `DynamicLibrary` | shared object opened with `libloading`    |
//! | `StaticSymbols`  | addresses of statically linked functions  |

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::future::ResultShape;
use crate::error::{Error, Result};

/// Anything that can map a symbol name to a function address
pub trait SymbolSource: Send + Sync {
    /// Address of `symbol`, if present
    fn address(&self, symbol: &str) -> Option<usize>;

    /// Human-readable name for errors and logs
    fn describe(&self) -> String;
}

// ============================================================================
// NAMING
// ============================================================================

/// Future entry point operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureOp {
    /// Register a continuation and make progress
    Poll,
    /// Retrieve the result
    Complete,
    /// Release the future
    Free,
    /// Stop the future
    Cancel,
}

impl FutureOp {
    fn as_str(self) -> &'static str {
        match self {
            FutureOp::Poll => "poll",
            FutureOp::Complete => "complete",
            FutureOp::Free => "free",
            FutureOp::Cancel => "cancel",
        }
    }
}

/// Builds symbol names from the two namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNames {
    namespace: String,
    ffi_namespace: String,
}

impl SymbolNames {
    /// Names under `namespace`, with buffer and future entry points under
    /// `ffi_namespace`
    pub fn new(namespace: impl Into<String>, ffi_namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ffi_namespace: ffi_namespace.into(),
        }
    }

    /// The `_fn_` namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The buffer/future namespace
    pub fn ffi_namespace(&self) -> &str {
        &self.ffi_namespace
    }

    /// `<ns>_fn_constructor_<type>_<member>`
    pub fn constructor(&self, type_name: &str, member: &str) -> String {
        format!("{}_fn_constructor_{}_{}", self.namespace, type_name, member)
    }

    /// `<ns>_fn_method_<type>_<member>`
    pub fn method(&self, type_name: &str, member: &str) -> String {
        format!("{}_fn_method_{}_{}", self.namespace, type_name, member)
    }

    /// `<ns>_fn_clone_<type>`
    pub fn clone_fn(&self, type_name: &str) -> String {
        format!("{}_fn_clone_{}", self.namespace, type_name)
    }

    /// `<ns>_fn_free_<type>`
    pub fn free_fn(&self, type_name: &str) -> String {
        format!("{}_fn_free_{}", self.namespace, type_name)
    }

    /// `<ns>_fn_func_<name>`
    pub fn function(&self, name: &str) -> String {
        format!("{}_fn_func_{}", self.namespace, name)
    }

    /// `<ffi_ns>_rust_future_<op>_<shape>`
    pub fn future(&self, op: FutureOp, shape: ResultShape) -> String {
        format!(
            "{}_rust_future_{}_{}",
            self.ffi_namespace,
            op.as_str(),
            shape.suffix()
        )
    }

    /// `<ffi_ns>_rustbuffer_from_bytes`
    pub fn buffer_from_bytes(&self) -> String {
        format!("{}_rustbuffer_from_bytes", self.ffi_namespace)
    }

    /// `<ffi_ns>_rustbuffer_free`
    pub fn buffer_free(&self) -> String {
        format!("{}_rustbuffer_free", self.ffi_namespace)
    }
}

// ============================================================================
// DYNAMIC LIBRARY
// ============================================================================

/// A shared library opened at runtime
pub struct DynamicLibrary {
    path: PathBuf,
    library: Library,
}

impl DynamicLibrary {
    /// Open the library at `path`.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialization code in this process.
    pub unsafe fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = Library::new(&path)?;
        tracing::info!(path = %path.display(), "native library loaded");
        Ok(Self { path, library })
    }

    /// Where the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for DynamicLibrary {
    fn address(&self, symbol: &str) -> Option<usize> {
        // SAFETY: only the address is read; callers give it a type.
        let found: std::result::Result<Symbol<'_, *const c_void>, _> =
            unsafe { self.library.get(symbol.as_bytes()) };
        found.ok().map(|sym| *sym as usize)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Resolves a library name to a file using platform naming
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    search_paths: Vec<PathBuf>,
}

impl Default for LibraryLocator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl LibraryLocator {
    /// Search `extra` first, then the working directory and platform defaults
    pub fn new(extra: Vec<PathBuf>) -> Self {
        let mut search_paths = extra;
        search_paths.extend(Self::default_search_paths());
        Self { search_paths }
    }

    /// Directories searched, in order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/usr/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        paths
    }

    /// File names tried for a bare library name, in priority order
    pub fn candidate_file_names(name: &str) -> Vec<String> {
        if cfg!(target_os = "windows") {
            vec![format!("{}.dll", name), format!("lib{}.dll", name)]
        } else if cfg!(target_os = "macos") {
            vec![
                format!("lib{}.dylib", name),
                format!("lib{}.so", name),
                format!("{}.dylib", name),
            ]
        } else {
            vec![format!("lib{}.so", name), format!("{}.so", name)]
        }
    }

    /// Resolve a path or bare name to an existing file
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.components().count() > 1 || direct.extension().is_some() {
            return direct.is_file().then(|| direct.to_path_buf());
        }

        let candidates = Self::candidate_file_names(name);
        self.search_paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|path| path.is_file())
        })
    }

    /// Resolve and open a library.
    ///
    /// # Safety
    ///
    /// See [`DynamicLibrary::open`].
    pub unsafe fn open(&self, name: &str) -> Result<DynamicLibrary> {
        let path = self.resolve(name).ok_or_else(|| {
            tracing::warn!(name, searched = self.search_paths.len(), "native library not found");
            Error::LibraryNotFound(name.to_string())
        })?;
        DynamicLibrary::open(path)
    }
}

// ============================================================================
// STATIC SYMBOLS
// ============================================================================

/// A symbol table of statically linked functions
#[derive(Debug, Clone, Default)]
pub struct StaticSymbols {
    label: String,
    entries: HashMap<String, usize>,
}

impl StaticSymbols {
    /// An empty table
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: HashMap::new(),
        }
    }

    /// Add a function address under `symbol`
    pub fn insert(&mut self, symbol: impl Into<String>, address: usize) -> &mut Self {
        self.entries.insert(symbol.into(), address);
        self
    }

    /// Builder form of [`StaticSymbols::insert`]
    pub fn with(mut self, symbol: impl Into<String>, address: usize) -> Self {
        self.insert(symbol, address);
        self
    }

    /// Number of symbols
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolSource for StaticSymbols {
    fn address(&self, symbol: &str) -> Option<usize> {
        self.entries.get(symbol).copied()
    }

    fn describe(&self) -> String {
        format!("static symbols '{}'", self.label)
    }
}

// ============================================================================
// TESTS
// ============================================================================
