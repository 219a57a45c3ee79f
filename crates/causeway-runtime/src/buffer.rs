//! Cross-boundary buffer ownership
//!
//! Composite values cross the boundary as byte buffers. Every buffer is
//! allocated and freed by the *native* library's helper entry points, so the
//! two sides never mix allocators; what moves across the boundary is
//! ownership, not memory. The rules:
//! - ownership transfers on every crossing;
//! - whoever owns a buffer frees it, exactly once;
//! - after freeing or transferring, the raw handle must not be touched
//!   again - this is enforced by the [`OwnedBuffer`] wrapper on the host
//!   side and by discipline on the raw [`FfiBuffer`] itself (a sharp edge:
//!   the raw struct is `Copy`, and stale copies are dangling).

use crate::error::{CallError, FatalResult};
use crate::status::{call_with_status, CallStatus};
use crate::wire::{decode_from_slice, encode_to_vec, CodecError, Decode, Encode};

/// A byte allocation owned by one side of the boundary at a time
///
/// Layout is part of the ABI contract with the native library.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiBuffer {
    pub capacity: u64,
    pub len: u64,
    pub data: *mut u8,
}

impl FfiBuffer {
    /// A well-formed empty buffer
    ///
    /// Zero-length values still cross the boundary as a real buffer so the
    /// encode and decode paths never diverge on the degenerate case.
    pub const fn empty() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: std::ptr::null_mut(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer contents
    ///
    /// # Safety
    ///
    /// The caller must currently own the buffer: not freed, not transferred
    /// across the boundary since this `FfiBuffer` value was obtained.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len as usize) }
        }
    }
}

/// A borrowed, non-owned byte view handed to the library allocator
///
/// Valid only as long as the bytes it was created from.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteSpan {
    pub len: i32,
    pub data: *const u8,
}

impl ByteSpan {
    /// Wrap a byte slice, failing if its length exceeds the span's `i32`
    pub fn new(bytes: &[u8]) -> Result<Self, CodecError> {
        let len = i32::try_from(bytes.len()).map_err(|_| CodecError::LengthOverflow {
            len: bytes.len(),
        })?;
        Ok(Self {
            len,
            data: bytes.as_ptr(),
        })
    }
}

/// Copy foreign bytes into a library-owned buffer
pub type BufferFromBytesFn = unsafe extern "C" fn(ByteSpan, *mut CallStatus) -> FfiBuffer;

/// Release a buffer the caller owns
pub type BufferFreeFn = unsafe extern "C" fn(FfiBuffer, *mut CallStatus);

/// The buffer helper entry points every conforming library exports
#[derive(Debug, Clone, Copy)]
pub struct BufferFns {
    pub from_bytes: BufferFromBytesFn,
    pub free: BufferFreeFn,
}

/// Safe wrapper over the library's buffer helpers
///
/// All host-side buffer traffic goes through one of these; the manager is
/// cheap to clone and hand to concurrent tasks.
#[derive(Debug, Clone)]
pub struct BufferManager {
    fns: BufferFns,
}

impl BufferManager {
    pub fn new(fns: BufferFns) -> Self {
        Self { fns }
    }

    /// Copy host bytes into a library-owned allocation
    ///
    /// A zero-length input yields a well-formed empty buffer.
    pub fn allocate(&self, bytes: &[u8]) -> FatalResult<OwnedBuffer> {
        let span = ByteSpan::new(bytes).map_err(crate::error::FatalError::from)?;
        let raw = call_with_status(self, |status| unsafe { (self.fns.from_bytes)(span, status) })
            .map_err(CallError::into_fatal)?;
        Ok(self.adopt(raw))
    }

    /// Assume ownership of a buffer the library just handed over
    pub fn adopt(&self, raw: FfiBuffer) -> OwnedBuffer {
        OwnedBuffer {
            raw,
            fns: self.fns,
        }
    }

    /// Encode a value and place it in a library-owned buffer
    pub fn encode<T: Encode>(&self, value: &T) -> FatalResult<OwnedBuffer> {
        let bytes = encode_to_vec(value).map_err(crate::error::FatalError::from)?;
        self.allocate(&bytes)
    }

    /// Adopt a result buffer and decode it, requiring full consumption
    ///
    /// The buffer is freed on every path out of this function.
    pub fn decode<T: Decode>(&self, raw: FfiBuffer) -> FatalResult<T> {
        let owned = self.adopt(raw);
        let value = decode_from_slice(owned.as_slice())?;
        Ok(value)
    }
}

/// RAII ownership of one boundary buffer
///
/// Freed through the library's `free` entry point exactly once - on drop,
/// unless ownership is transferred back across the boundary with
/// [`OwnedBuffer::into_raw`].
#[derive(Debug)]
pub struct OwnedBuffer {
    raw: FfiBuffer,
    fns: BufferFns,
}

// Safety: the buffer allocation is owned exclusively by this value until
// drop or into_raw, like a Vec; the helper entry points are required to be
// callable from any thread.
unsafe impl Send for OwnedBuffer {}
unsafe impl Sync for OwnedBuffer {}

impl OwnedBuffer {
    pub fn as_slice(&self) -> &[u8] {
        // Safety: owned until drop/into_raw by construction
        unsafe { self.raw.as_slice() }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    pub fn len(&self) -> usize {
        self.raw.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Transfer ownership back across the boundary
    ///
    /// The caller (ultimately the native side) becomes responsible for the
    /// exactly-once free.
    pub fn into_raw(self) -> FfiBuffer {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        let mut status = CallStatus::new();
        unsafe { (self.fns.free)(self.raw, &mut status) };
        if !status.is_success() {
            // Drop cannot propagate; a failing free is a library defect
            tracing::error!(code = status.code, "buffer free reported status");
        }
    }
}
