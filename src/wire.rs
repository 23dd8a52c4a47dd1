//! JSON error payload exchanged when an endpoint fails
//!
//! A response buffer holds either an encoded protobuf message or one of these objects; the
//! reader tells them apart by trying the protobuf decode first.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.as_str().to_string()),
            message: message.into(),
        }
    }

    /// The symbolic code, `INTERNAL_ERROR` when absent
    pub fn code(&self) -> ErrorCode {
        match &self.error_code {
            Some(name) => name.parse().unwrap_or(ErrorCode::InternalError),
            None => ErrorCode::InternalError,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        // Two string fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"error_code":"INTERNAL_ERROR","message":""}"#.to_vec())
    }
}

impl From<ErrorPayload> for BridgeError {
    fn from(payload: ErrorPayload) -> Self {
        BridgeError::domain(payload.code(), payload.message)
    }
}

impl From<&BridgeError> for ErrorPayload {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::Domain { code, message } => Self::new(code.clone(), message.clone()),
            other => Self::new(ErrorCode::InternalError, other.to_string()),
        }
    }
}
