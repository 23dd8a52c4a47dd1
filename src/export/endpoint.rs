//! Helpers for implementing exported endpoints on the native side of the ABI
//!
//! Responses are allocated with the C allocator and released by [`free_response`] (or plain
//! `free`), matching what the host expects from any library that follows the service ABI.

use std::ffi::{c_int, c_void};
use std::ptr;
use std::slice;

use prost::Message;
use tracing::debug;

use crate::error::{BridgeError, ErrorCode, Result};
use crate::wire::ErrorPayload;

/// Borrow the bytes of a request or configuration buffer
///
/// # Safety
///
/// `data` must be null or point to `size` readable bytes that outlive the returned slice.
pub unsafe fn input_bytes<'a>(data: *const c_void, size: c_int) -> &'a [u8] {
    if data.is_null() || size <= 0 {
        return &[];
    }
    slice::from_raw_parts(data.cast::<u8>(), size as usize)
}

/// Decode a request, run `handler`, and return the encoded response or error payload
///
/// A request that does not decode is answered with `BAD_REQUEST`; a handler error is answered
/// with its own code (`INTERNAL_ERROR` for errors that carry none).
///
/// # Safety
///
/// `data` must satisfy [`input_bytes`]; `response_size` must be valid for writes.
pub unsafe fn respond<Req, Resp, F>(
    data: *const c_void,
    size: c_int,
    response_size: *mut c_int,
    handler: F,
) -> *mut c_void
where
    Req: Message + Default,
    Resp: Message,
    F: FnOnce(Req) -> Result<Resp>,
{
    let request = match Req::decode(input_bytes(data, size)) {
        Ok(request) => request,
        Err(e) => {
            let payload = ErrorPayload::new(ErrorCode::BadRequest, e.to_string());
            return write_bytes(&payload.to_vec(), response_size);
        }
    };

    match handler(request) {
        Ok(response) => {
            let bytes = response.encode_to_vec();
            if c_int::try_from(bytes.len()).is_err() {
                let err = BridgeError::domain(
                    ErrorCode::InternalError,
                    format!("response of {} bytes exceeds the C int range", bytes.len()),
                );
                return write_error(&err, response_size);
            }
            write_bytes(&bytes, response_size)
        }
        Err(e) => {
            debug!(error = %e, "Endpoint returned an error");
            write_error(&e, response_size)
        }
    }
}

/// Write `err` as a JSON error payload
///
/// # Safety
///
/// `response_size` must be valid for writes.
pub unsafe fn write_error(err: &BridgeError, response_size: *mut c_int) -> *mut c_void {
    write_bytes(&ErrorPayload::from(err).to_vec(), response_size)
}

/// Copy `bytes` into a buffer from the C allocator and report its length
///
/// Empty input yields a null pointer with length 0; so does an allocation failure.
///
/// # Safety
///
/// `response_size` must be valid for writes.
pub unsafe fn write_bytes(bytes: &[u8], response_size: *mut c_int) -> *mut c_void {
    let len = match c_int::try_from(bytes.len()) {
        Ok(len) if len > 0 => len,
        _ => {
            *response_size = 0;
            return ptr::null_mut();
        }
    };

    let buffer = libc::malloc(bytes.len());
    if buffer.is_null() {
        *response_size = 0;
        return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), bytes.len());
    *response_size = len;
    buffer
}

/// Release a buffer returned by an endpoint
///
/// # Safety
///
/// `ptr` must be null or come from [`write_bytes`], and not be released twice.
pub unsafe extern "C" fn free_response(ptr: *mut c_void) {
    libc::free(ptr);
}
