//! The loaded native library: bindings plus the mapped image they point into

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use super::binding::BindingTable;
use super::header::Header;
use super::library::Library;
use super::locator::LibraryLocator;
use super::STATS;
use crate::error::{BridgeError, Result};

static SHARED: OnceCell<Arc<NativeLibrary>> = OnceCell::new();

/// A bound native library
///
/// Once opened the library is never unloaded: the runtime it embeds cannot be torn down, so the
/// image stays mapped until the process exits.
#[derive(Debug)]
pub struct NativeLibrary {
    bindings: BindingTable,
    path: Option<PathBuf>,
    _library: Option<&'static Library>,
}

impl NativeLibrary {
    /// Open the library at `path` and bind the symbols its header declares
    ///
    /// The header is expected next to the library with the extension `.h`.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BridgeError::NotFound {
                what: "shared library",
                path: path.to_path_buf(),
            });
        }
        let header = Header::load(&path.with_extension("h"))?;

        let library: &'static Library = Box::leak(Box::new(Library::load_path(path)?));
        let bindings = BindingTable::from_header(&header, |name| library.symbol(name).ok())?;
        STATS.record_library_loaded();

        info!(
            path = %path.display(),
            symbols = bindings.len(),
            free = bindings.free_symbol(),
            "Loaded native library"
        );

        Ok(Self {
            bindings,
            path: Some(path.to_path_buf()),
            _library: Some(library),
        })
    }

    /// Wrap bindings that point into code already linked into this process
    pub fn from_bindings(bindings: BindingTable) -> Self {
        STATS.record_library_loaded();
        Self {
            bindings,
            path: None,
            _library: None,
        }
    }

    /// The process-wide library, located (or built) and opened on first use
    pub fn shared() -> Result<Arc<Self>> {
        SHARED
            .get_or_try_init(|| {
                let located = LibraryLocator::from_env().locate_or_build()?;
                Self::open(&located.path).map(Arc::new)
            })
            .cloned()
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Path the library was loaded from, `None` for in-process bindings
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
