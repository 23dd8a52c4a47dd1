//! Dynamic library loading and symbol resolution
//!
//! Thin wrapper around `libloading` that reports failures in this crate's error types.

use std::ffi::CString;
use std::path::Path;

/// Handle to a dynamically loaded library
pub struct Library {
    inner: libloading::Library,
}

impl Library {
    /// Load a library from an explicit path
    pub fn load_path(path: &Path) -> Result<Self, LoadError> {
        if path.as_os_str().is_empty() {
            return Err(LoadError::InvalidName);
        }
        Self::open(path.as_os_str())
    }

    fn open(name: &std::ffi::OsStr) -> Result<Self, LoadError> {
        // SAFETY: loading runs the library's initializers; callers only point this at
        // libraries that follow the service ABI.
        let inner = unsafe { libloading::Library::new(name) }
            .map_err(|e| LoadError::LoadFailed(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Get the address of an exported symbol
    pub fn symbol(&self, name: &str) -> Result<*const (), SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        // SAFETY: the address is only read here; callers check the declared signature before
        // turning it into a typed function pointer.
        unsafe {
            let symbol = self
                .inner
                .get::<unsafe extern "C" fn()>(cname.as_bytes_with_nul())
                .map_err(|_| SymbolError::NotFound)?;
            let ptr = *symbol as *const ();
            if ptr.is_null() {
                Err(SymbolError::NotFound)
            } else {
                Ok(ptr)
            }
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").finish_non_exhaustive()
    }
}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid library name")]
    InvalidName,
    #[error("Failed to load library: {0}")]
    LoadFailed(String),
}

/// Symbol lookup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("Invalid symbol name")]
    InvalidName,
    #[error("Symbol not found")]
    NotFound,
}
