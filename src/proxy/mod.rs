//! Request/response proxy over the C ABI
//!
//! Each call encodes a protobuf request, invokes the endpoint symbol, and decodes whatever the
//! native side wrote into its response buffer. A buffer that is not a valid response message is
//! read as a JSON [`ErrorPayload`]; a buffer that is neither is a protocol violation.

use std::ffi::{c_int, c_void};
use std::sync::Arc;

use prost::Message;
use tracing::{debug, debug_span, warn};

use crate::config::ConfigBlob;
use crate::error::{BridgeError, Result};
use crate::interop::{NativeLibrary, STATS};
use crate::logging::perf;
use crate::service::{ServiceHandle, ServiceKind};
use crate::wire::ErrorPayload;

mod buffer;

pub use buffer::ResponseBuffer;

/// A request message bound to the endpoint that serves it
pub trait Endpoint: Message + Sized {
    type Response: Message + Default;

    const SERVICE: ServiceKind;

    /// Endpoint name, which is also the request message name
    const NAME: &'static str;

    /// Exported symbol, e.g. `TrackingServiceGetRun`
    fn symbol() -> String {
        Self::SERVICE.endpoint_symbol(Self::NAME)
    }
}

/// Proxy for the endpoints of one service instance
///
/// Calls block the calling thread until the native side returns. The proxy holds no lock around
/// its handle; share it across threads only if the native service tolerates concurrent calls.
#[derive(Debug)]
pub struct ServiceProxy {
    handle: ServiceHandle,
}

impl ServiceProxy {
    pub fn new(handle: ServiceHandle) -> Self {
        Self { handle }
    }

    /// Create a service instance and wrap it
    pub fn create(library: Arc<NativeLibrary>, kind: ServiceKind, config: &ConfigBlob) -> Result<Self> {
        ServiceHandle::create(library, kind, config).map(Self::new)
    }

    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    /// Destroy the service instance; later calls fail with [`BridgeError::HandleDestroyed`]
    pub fn destroy(&self) -> bool {
        self.handle.destroy()
    }

    /// Send `request` to its endpoint and decode the response
    pub fn call<E: Endpoint>(&self, request: &E) -> Result<E::Response> {
        if E::SERVICE != self.handle.kind() {
            return Err(BridgeError::Protocol(format!(
                "{} request sent to a {} service",
                E::NAME,
                self.handle.kind()
            )));
        }
        let id = self.handle.live_id()?;
        let symbol = E::symbol();

        let span = debug_span!("call", endpoint = %symbol, id);
        let _enter = span.enter();
        let _perf = perf::track(&symbol);

        let bindings = self.handle.library().bindings();
        let endpoint = bindings.endpoint(&symbol)?;
        let free = bindings.free_fn();

        let request = request.encode_to_vec();
        let size = c_int::try_from(request.len()).map_err(|_| {
            BridgeError::Protocol(format!("request of {} bytes exceeds the C int range", request.len()))
        })?;

        let mut response_len: c_int = 0;
        STATS.record_call();
        // SAFETY: signature checked by the binding table; `request` and `response_len` outlive
        // the call and the id belongs to a live instance of this service.
        let ptr = unsafe {
            endpoint(
                id,
                request.as_ptr().cast::<c_void>(),
                size,
                &mut response_len,
            )
        };

        // SAFETY: `ptr` and `response_len` are exactly what the endpoint returned.
        let buffer = unsafe { ResponseBuffer::acquire(ptr, response_len, free) };
        let result = buffer.as_bytes().and_then(decode_response::<E::Response>);

        match &result {
            Ok(_) => debug!(bytes = buffer.len(), "Call succeeded"),
            Err(e @ BridgeError::Domain { .. }) => debug!(error = %e, "Call returned an error"),
            Err(e) => warn!(error = %e, "Call failed"),
        }
        result
    }
}

/// Decode a response buffer as `M`, falling back to the JSON error payload
pub fn decode_response<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    let decode_error = match M::decode(bytes) {
        Ok(message) => return Ok(message),
        Err(e) => e,
    };

    match ErrorPayload::from_slice(bytes) {
        Ok(payload) => {
            STATS.record_domain_error();
            Err(payload.into())
        }
        Err(json_error) => {
            STATS.record_protocol_error();
            Err(BridgeError::Protocol(format!(
                "Failed to parse response: {}; not an error payload either: {}",
                decode_error, json_error
            )))
        }
    }
}
