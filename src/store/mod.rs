//! Stores backed by the native services
//!
//! [`TrackingStore`] and [`ModelRegistryStore`] describe the operations a store offers. Every
//! method defaults to [`BridgeError::Unsupported`], so an implementation only provides what its
//! backend serves; [`AugmentedStore`] pairs a native store with a complete fallback and routes
//! each call to whichever one supports it.

use std::env;
use std::path::Path;

use crate::config::Settings;
use crate::error::{BridgeError, Result};

mod augmented;
mod model_registry;
mod tracking;

pub use augmented::AugmentedStore;
pub use model_registry::{ModelRegistryStore, NativeModelRegistryStore};
pub use tracking::{ExperimentSearch, NativeTrackingStore, NewRun, Page, RunSearch, TrackingStore};

/// Presence of this variable enables the native stores
pub const ENABLED_ENV: &str = "MLFLOW_GO_ENABLED";

/// Options applied when stores are constructed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Route supported operations to the native library
    pub native_enabled: bool,
    /// Level name forwarded to the native logger; the active host level when unset
    pub log_level: Option<String>,
}

impl StoreOptions {
    pub fn new(native_enabled: bool) -> Self {
        Self {
            native_enabled,
            log_level: None,
        }
    }

    /// Options from the environment: native stores are enabled when `MLFLOW_GO_ENABLED` is set
    pub fn from_env() -> Self {
        Self::new(env::var_os(ENABLED_ENV).is_some())
    }

    /// Options from a settings file, enabled by either the file or the environment
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.library.native_enabled || env::var_os(ENABLED_ENV).is_some())
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub(crate) fn log_level_name(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| crate::logging::native_level_name().to_string())
    }
}

/// Turn a local path into an absolute `file://` URI; URIs with a scheme pass through
pub fn resolve_uri_if_local(uri: &str) -> Result<String> {
    if has_scheme(uri) {
        return Ok(uri.to_string());
    }

    let path = Path::new(uri);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let text = absolute
        .to_str()
        .ok_or_else(|| BridgeError::Config(format!("path {} is not valid UTF-8", absolute.display())))?
        .replace('\\', "/");

    if text.starts_with('/') {
        Ok(format!("file://{}", text))
    } else {
        Ok(format!("file:///{}", text))
    }
}

/// Whether `uri` names a local path rather than a remote store
pub fn is_local_uri(uri: &str) -> bool {
    !has_scheme(uri) || uri.starts_with("file:")
}

fn has_scheme(uri: &str) -> bool {
    match uri.find(':') {
        // a single letter before ':' is a Windows drive, not a scheme
        Some(i) if i > 1 => uri[..i]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        _ => false,
    }
}
