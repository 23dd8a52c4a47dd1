//! Error taxonomy for the bridge
//!
//! Every fallible operation returns [`BridgeError`]. Only [`BridgeError::Domain`] is meant to be
//! recovered by callers; the rest indicate build, binding, or contract failures.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::interop::{LoadError, SymbolError};
use crate::service::ServiceKind;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to build native library: {0}")]
    Build(String),

    #[error("{what} not found at {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("malformed header at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("symbol '{name}': {source}")]
    Symbol { name: String, source: SymbolError },

    #[error("symbol '{name}' is declared as `{declared}`, expected a {expected} signature")]
    Signature {
        name: String,
        expected: &'static str,
        declared: String,
    },

    #[error("{operation} returned {code}")]
    Launch { operation: String, code: i64 },

    #[error("{code}: {message}")]
    Domain { code: ErrorCode, message: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("server shutdown failed with code {code}")]
    Shutdown { code: i64 },

    #[error("server at {address} did not accept connections within {timeout:?}")]
    NotReady { address: String, timeout: Duration },

    #[error("{kind} service handle {id} has already been destroyed")]
    HandleDestroyed { kind: ServiceKind, id: i64 },

    #[error("{0} is not supported by this store")]
    Unsupported(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn domain(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
        }
    }

    /// Error code of a [`BridgeError::Domain`], `None` for every other variant
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Domain { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_resource_missing(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::ResourceDoesNotExist))
    }
}

/// Symbolic error codes reported by the native service
///
/// Names follow the tracking server's `ErrorCode` enumeration. Names this crate does not know
/// are preserved verbatim in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    TemporarilyUnavailable,
    IoError,
    BadRequest,
    InvalidParameterValue,
    EndpointNotFound,
    MalformedRequest,
    InvalidState,
    PermissionDenied,
    FeatureDisabled,
    RequestLimitExceeded,
    ResourceAlreadyExists,
    ResourceDoesNotExist,
    NotImplemented,
    Other(String),
}

impl ErrorCode {
    const NAMES: &'static [(&'static str, ErrorCode)] = &[
        ("INTERNAL_ERROR", ErrorCode::InternalError),
        ("TEMPORARILY_UNAVAILABLE", ErrorCode::TemporarilyUnavailable),
        ("IO_ERROR", ErrorCode::IoError),
        ("BAD_REQUEST", ErrorCode::BadRequest),
        ("INVALID_PARAMETER_VALUE", ErrorCode::InvalidParameterValue),
        ("ENDPOINT_NOT_FOUND", ErrorCode::EndpointNotFound),
        ("MALFORMED_REQUEST", ErrorCode::MalformedRequest),
        ("INVALID_STATE", ErrorCode::InvalidState),
        ("PERMISSION_DENIED", ErrorCode::PermissionDenied),
        ("FEATURE_DISABLED", ErrorCode::FeatureDisabled),
        ("REQUEST_LIMIT_EXCEEDED", ErrorCode::RequestLimitExceeded),
        ("RESOURCE_ALREADY_EXISTS", ErrorCode::ResourceAlreadyExists),
        ("RESOURCE_DOES_NOT_EXIST", ErrorCode::ResourceDoesNotExist),
        ("NOT_IMPLEMENTED", ErrorCode::NotImplemented),
    ];

    pub fn as_str(&self) -> &str {
        if let Self::Other(name) = self {
            return name;
        }
        Self::NAMES
            .iter()
            .find(|(_, code)| code == self)
            .map(|(name, _)| *name)
            .unwrap_or("INTERNAL_ERROR")
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, code)| code.clone())
            .unwrap_or_else(|| Self::Other(s.to_string())))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
