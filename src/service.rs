//! Service handles: one native service instance per store

use std::ffi::c_int;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigBlob;
use crate::error::{BridgeError, Result};
use crate::interop::NativeLibrary;

/// Services the native library hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Tracking,
    ModelRegistry,
    Artifacts,
}

impl ServiceKind {
    /// Prefix of this service's exported symbols, e.g. `TrackingService`
    pub fn symbol_prefix(self) -> &'static str {
        match self {
            Self::Tracking => "TrackingService",
            Self::ModelRegistry => "ModelRegistryService",
            Self::Artifacts => "ArtifactsService",
        }
    }

    pub fn constructor_symbol(self) -> String {
        format!("Create{}", self.symbol_prefix())
    }

    pub fn destructor_symbol(self) -> String {
        format!("Destroy{}", self.symbol_prefix())
    }

    /// Symbol of the endpoint serving `request`, e.g. `TrackingServiceGetRun`
    pub fn endpoint_symbol(self, request: &str) -> String {
        format!("{}{}", self.symbol_prefix(), request)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracking => f.write_str("tracking"),
            Self::ModelRegistry => f.write_str("model registry"),
            Self::Artifacts => f.write_str("artifacts"),
        }
    }
}

/// A live service instance inside the native library
///
/// The instance is destroyed at most once, by [`ServiceHandle::destroy`] or on drop. Calls
/// through one handle are not synchronized; callers serialize their use of it.
pub struct ServiceHandle {
    library: Arc<NativeLibrary>,
    kind: ServiceKind,
    id: i64,
    destroyed: AtomicBool,
}

impl ServiceHandle {
    /// Create a service instance configured by `config`
    pub fn create(library: Arc<NativeLibrary>, kind: ServiceKind, config: &ConfigBlob) -> Result<Self> {
        let symbol = kind.constructor_symbol();
        let constructor = library.bindings().constructor(&symbol)?;
        // Resolve now so a handle is never created without a way to destroy it.
        library.bindings().destructor(&kind.destructor_symbol())?;

        let bytes = config.to_bytes()?;
        let size = c_int::try_from(bytes.len())
            .map_err(|_| BridgeError::Config(format!("configuration of {} bytes is too large", bytes.len())))?;

        // SAFETY: signature checked by the binding table; the buffer outlives the call.
        let id = unsafe { constructor(bytes.as_ptr().cast(), size) };
        if id < 0 {
            warn!(service = %kind, code = id, "Service creation failed");
            return Err(BridgeError::Launch {
                operation: symbol,
                code: id,
            });
        }

        info!(service = %kind, id, "Created service instance");
        Ok(Self {
            library,
            kind,
            id,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn library(&self) -> &Arc<NativeLibrary> {
        &self.library
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Id to pass to an endpoint, or an error once the instance is gone
    pub fn live_id(&self) -> Result<i64> {
        if self.is_destroyed() {
            return Err(BridgeError::HandleDestroyed {
                kind: self.kind,
                id: self.id,
            });
        }
        Ok(self.id)
    }

    /// Destroy the native instance; returns whether this call did it
    pub fn destroy(&self) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            debug!(service = %self.kind, id = self.id, "Service instance already destroyed");
            return false;
        }

        match self.library.bindings().destructor(&self.kind.destructor_symbol()) {
            Ok(destructor) => {
                // SAFETY: signature checked; the id came from the matching constructor.
                unsafe { destructor(self.id) };
                debug!(service = %self.kind, id = self.id, "Destroyed service instance");
                true
            }
            Err(e) => {
                warn!(service = %self.kind, id = self.id, error = %e, "Cannot destroy service instance");
                false
            }
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_names() {
        assert_eq!(ServiceKind::Tracking.constructor_symbol(), "CreateTrackingService");
        assert_eq!(ServiceKind::ModelRegistry.destructor_symbol(), "DestroyModelRegistryService");
        assert_eq!(
            ServiceKind::Tracking.endpoint_symbol("GetExperimentByName"),
            "TrackingServiceGetExperimentByName"
        );
        assert_eq!(ServiceKind::Artifacts.symbol_prefix(), "ArtifactsService");
    }
}
