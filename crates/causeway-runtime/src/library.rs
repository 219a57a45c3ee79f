//! Native library loading
//!
//! Cross-platform loading of the native library the bridge attaches to,
//! using `libloading`. Handles platform-specific naming conventions and
//! search paths; symbol lookup yields the typed entry-point pointers the
//! rest of the bridge calls through.
//!
//! # Safety
//!
//! Loading a dynamic library runs its initialization code in-process, and
//! every symbol cast asserts an ABI the compiler cannot check. All of that
//! `unsafe` is isolated here; the [`NativeLibrary`] owner must outlive any
//! pointer resolved from it.

use causeway_config::BridgeConfig;
use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library loading errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// Library file not found in search paths
    #[error("native library not found: {0}")]
    NotFound(String),

    /// Symbol not found in the loaded library
    #[error("symbol `{symbol}` not found in `{library}`")]
    SymbolNotFound { library: String, symbol: String },

    /// Failed to load the library file
    #[error("failed to load `{library}`: {message}")]
    LoadFailed { library: String, message: String },
}

/// A loaded native library plus the path it was resolved from
pub struct NativeLibrary {
    library: Library,
    path: PathBuf,
}

impl NativeLibrary {
    /// Load the library a [`BridgeConfig`] describes
    ///
    /// An explicit `library.path` wins; otherwise `library.name` is
    /// resolved against the configured search paths, then the platform
    /// defaults, with platform prefix and extension conventions applied.
    pub fn load(config: &BridgeConfig) -> Result<Self, LibraryError> {
        if let Some(path) = &config.library.path {
            return Self::open(path);
        }

        let name = config
            .library
            .name
            .as_deref()
            .ok_or_else(|| LibraryError::NotFound("<unconfigured>".to_string()))?;

        let path = resolve_library_path(name, &config.library.search_paths)
            .ok_or_else(|| LibraryError::NotFound(name.to_string()))?;
        Self::open(&path)
    }

    /// Load a library from an explicit path
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        tracing::debug!(path = %path.display(), "loading native library");
        let library = unsafe {
            Library::new(path).map_err(|e| LibraryError::LoadFailed {
                library: path.display().to_string(),
                message: e.to_string(),
            })?
        };
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Resolve a typed entry point by symbol name
    ///
    /// # Safety
    ///
    /// `T` must be the symbol's actual type (in practice an
    /// `unsafe extern "C" fn` pointer), and the returned value must not be
    /// used after this library is dropped.
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T, LibraryError> {
        let symbol = unsafe {
            self.library
                .get::<T>(name.as_bytes())
                .map_err(|_| LibraryError::SymbolNotFound {
                    library: self.path.display().to_string(),
                    symbol: name.to_string(),
                })?
        };
        Ok(*symbol)
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

/// Platform-specific default library search paths
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));

        if cfg!(target_pointer_width = "64") {
            paths.push(PathBuf::from("/usr/lib64"));
            paths.push(PathBuf::from("/lib64"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Windows\\System32"));
        if let Ok(system_root) = std::env::var("SystemRoot") {
            paths.push(PathBuf::from(format!("{}\\System32", system_root)));
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.insert(0, cwd);
    }

    paths
}

/// Resolve a short library name to a full path
///
/// Tries each configured search path before the platform defaults, with
/// platform naming conventions:
/// - Linux: lib{name}.so
/// - macOS: lib{name}.dylib or lib{name}.so
/// - Windows: {name}.dll
fn resolve_library_path(name: &str, extra_paths: &[PathBuf]) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.is_absolute() && as_path.exists() {
        return Some(as_path.to_path_buf());
    }

    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };

    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    let search_paths: Vec<PathBuf> = extra_paths
        .iter()
        .cloned()
        .chain(default_search_paths())
        .collect();

    for search_path in &search_paths {
        for prefix in prefixes {
            for extension in extensions {
                let filename = format!("{prefix}{name}.{extension}");
                let full_path = search_path.join(&filename);
                if full_path.exists() {
                    return Some(full_path);
                }
            }
        }
    }

    None
}
