//! Scoped ownership of a native response buffer

use std::ffi::{c_int, c_void};
use std::slice;

use crate::error::{BridgeError, Result};
use crate::interop::{FreeFn, STATS};

/// Response bytes allocated by the native side, released exactly once on drop
pub struct ResponseBuffer {
    ptr: *mut c_void,
    len: c_int,
    free: FreeFn,
}

impl ResponseBuffer {
    /// Take ownership of a buffer returned by an endpoint
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to at least `len` readable bytes that `free` releases, and
    /// nothing else may release it.
    pub unsafe fn acquire(ptr: *mut c_void, len: c_int, free: FreeFn) -> Self {
        Self { ptr, len, free }
    }

    /// Reported length, clamped at zero
    pub fn len(&self) -> usize {
        usize::try_from(self.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The response bytes
    ///
    /// A null pointer with zero length is the empty payload. A negative length, or a null
    /// pointer with a non-zero length, breaks the endpoint contract.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        if self.len < 0 {
            return Err(BridgeError::Protocol(format!(
                "endpoint reported negative response length {}",
                self.len
            )));
        }
        if self.ptr.is_null() {
            if self.len == 0 {
                return Ok(&[]);
            }
            return Err(BridgeError::Protocol(format!(
                "endpoint returned a null buffer with length {}",
                self.len
            )));
        }

        // SAFETY: non-null and at least `len` bytes long per the `acquire` contract; the slice
        // borrows `self`, so it cannot outlive the buffer.
        Ok(unsafe { slice::from_raw_parts(self.ptr.cast::<u8>(), self.len as usize) })
    }
}

impl Drop for ResponseBuffer {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // SAFETY: owned since `acquire`; released only here.
        unsafe { (self.free)(self.ptr) };
        STATS.record_release();
    }
}

impl std::fmt::Debug for ResponseBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static FREED: Cell<usize> = Cell::new(0);
    }

    extern "C" fn counting_free(ptr: *mut c_void) {
        FREED.with(|freed| freed.set(freed.get() + 1));
        unsafe { libc::free(ptr) };
    }

    fn malloc_bytes(bytes: &[u8]) -> *mut c_void {
        unsafe {
            let ptr = libc::malloc(bytes.len().max(1));
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            ptr
        }
    }

    #[test]
    fn test_bytes_and_single_release() {
        FREED.with(|freed| freed.set(0));
        {
            let buffer = unsafe { ResponseBuffer::acquire(malloc_bytes(b"abc"), 3, counting_free) };
            assert_eq!(buffer.as_bytes().unwrap(), b"abc");
            assert_eq!(buffer.len(), 3);
        }
        assert_eq!(FREED.with(Cell::get), 1);
    }

    #[test]
    fn test_null_empty_buffer() {
        FREED.with(|freed| freed.set(0));
        {
            let buffer = unsafe { ResponseBuffer::acquire(std::ptr::null_mut(), 0, counting_free) };
            assert!(buffer.as_bytes().unwrap().is_empty());
            assert!(buffer.is_empty());
        }
        assert_eq!(FREED.with(Cell::get), 0);
    }

    #[test]
    fn test_contract_violations() {
        FREED.with(|freed| freed.set(0));
        {
            let null = unsafe { ResponseBuffer::acquire(std::ptr::null_mut(), 5, counting_free) };
            assert!(matches!(null.as_bytes(), Err(BridgeError::Protocol(_))));

            let negative = unsafe { ResponseBuffer::acquire(malloc_bytes(b"x"), -1, counting_free) };
            assert!(matches!(negative.as_bytes(), Err(BridgeError::Protocol(_))));
        }
        // the non-null buffer is still released
        assert_eq!(FREED.with(Cell::get), 1);
    }
}
