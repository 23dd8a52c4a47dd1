//! Interoperability with the native service library
//!
//! Architecture:
//! - `locator.rs` - find the shared library, or build it with the Go toolchain
//! - `cleanup.rs` - remove build directories at process exit
//! - `header.rs` - read exported declarations from the generated header
//! - `types.rs` - C type descriptors for those declarations
//! - `library.rs` - dynamic library loading
//! - `binding.rs` - signature-checked access to resolved symbols
//! - `native.rs` - the opened library as a whole

use std::sync::atomic::{AtomicUsize, Ordering};

mod binding;
pub mod cleanup;
mod header;
mod library;
pub mod locator;
mod native;
mod types;

pub use binding::{
    BindingTable, ConstructorFn, DestructorFn, EndpointFn, FreeFn, Signature, StopFn,
    FREE_RESPONSE,
};
pub use header::{Declaration, Header, Param};
pub use library::{Library, LoadError, SymbolError};
pub use locator::{build_library, BuildTarget, LibraryLocator, LocatedLibrary};
pub use native::NativeLibrary;
pub use types::CType;

pub(crate) static STATS: Counters = Counters::new();

pub(crate) struct Counters {
    calls_made: AtomicUsize,
    buffers_released: AtomicUsize,
    domain_errors: AtomicUsize,
    protocol_errors: AtomicUsize,
    libraries_loaded: AtomicUsize,
}

impl Counters {
    const fn new() -> Self {
        Self {
            calls_made: AtomicUsize::new(0),
            buffers_released: AtomicUsize::new(0),
            domain_errors: AtomicUsize::new(0),
            protocol_errors: AtomicUsize::new(0),
            libraries_loaded: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record_call(&self) {
        self.calls_made.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.buffers_released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_domain_error(&self) {
        self.domain_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_library_loaded(&self) {
        self.libraries_loaded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Get interop statistics
pub fn stats() -> InteropStats {
    InteropStats {
        calls_made: STATS.calls_made.load(Ordering::Relaxed),
        buffers_released: STATS.buffers_released.load(Ordering::Relaxed),
        domain_errors: STATS.domain_errors.load(Ordering::Relaxed),
        protocol_errors: STATS.protocol_errors.load(Ordering::Relaxed),
        libraries_loaded: STATS.libraries_loaded.load(Ordering::Relaxed),
    }
}

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: usize,
    pub buffers_released: usize,
    pub domain_errors: usize,
    pub protocol_errors: usize,
    pub libraries_loaded: usize,
}
