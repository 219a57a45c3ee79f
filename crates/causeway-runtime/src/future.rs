//! Async call bridge
//!
//! Native asynchronous operations follow a poll/continuation protocol. The
//! initiating entry point returns an opaque handle; the library then exports
//! a triple per operation:
//! - `poll(handle, continuation, data)`: schedule `continuation(data, code)`
//!   to run once the operation advances;
//! - `complete(handle, status) -> value`: extract the result once ready;
//! - `free(handle)`: release the native side of the operation.
//!
//! [`drive`] is the host-side driver: it suspends the calling task between
//! each `poll` and its continuation, calls `complete` exactly once when the
//! continuation reports ready, and frees the handle exactly once on every
//! exit path - success, typed error, fault, or the caller dropping the
//! future mid-flight (cancellation).

use crate::buffer::BufferManager;
use crate::error::{CallError, CallResult, FatalError};
use crate::status::{call_with_status, CallStatus};
use crate::wire::Decode;
use tokio::sync::oneshot;

/// Opaque identifier of one in-flight native operation
pub type FutureHandle = u64;

/// Continuation code: the operation has a result ready
pub const POLL_READY: i8 = 0;

/// Continuation code: progress was made, poll again
pub const POLL_WAKE: i8 = 1;

/// Continuation invoked by the native side when an operation advances
pub type ContinuationFn = unsafe extern "C" fn(data: u64, code: i8);

/// The per-operation async entry points
pub struct FutureVtable<T> {
    pub poll: unsafe extern "C" fn(FutureHandle, ContinuationFn, u64),
    pub complete: unsafe extern "C" fn(FutureHandle, *mut CallStatus) -> T,
    pub free: unsafe extern "C" fn(FutureHandle),
}

impl<T> Clone for FutureVtable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FutureVtable<T> {}

/// Frees the native handle exactly once, on whatever path the driver exits
struct HandleGuard {
    handle: FutureHandle,
    free: unsafe extern "C" fn(FutureHandle),
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe { (self.free)(self.handle) };
    }
}

/// Drive a native async operation to completion
///
/// Suspends between each `poll` and its continuation; calls `complete` at
/// most once per handle. `T` is the operation's FFI-level return value
/// (typically a buffer), `E` its declared error type.
///
/// Dropping the returned future cancels the operation: the handle is freed
/// immediately and `complete` is never called. The native side must flush
/// any armed continuation before `free(handle)` returns.
pub async fn drive<T, E>(
    buffers: &BufferManager,
    handle: FutureHandle,
    vtable: FutureVtable<T>,
) -> CallResult<T, E>
where
    E: Decode,
{
    let _guard = HandleGuard {
        handle,
        free: vtable.free,
    };

    loop {
        let (sender, receiver) = oneshot::channel::<i8>();
        let data = Box::into_raw(Box::new(sender)) as u64;
        unsafe { (vtable.poll)(handle, continuation, data) };

        match receiver.await {
            Ok(POLL_READY) => break,
            Ok(_) => continue,
            Err(_) => return Err(CallError::Fatal(FatalError::ContinuationDropped)),
        }
    }

    tracing::trace!(handle, "async operation ready");
    call_with_status(buffers, |status| unsafe { (vtable.complete)(handle, status) })
}

/// Trampoline handed to the native side with every `poll`
///
/// Safety contract with the library: `data` is the sender armed by the
/// matching `poll` call, invoked at most once. A send into a driver that
/// was dropped mid-flight is a no-op race loss, not an error.
unsafe extern "C" fn continuation(data: u64, code: i8) {
    let sender = unsafe { Box::from_raw(data as *mut oneshot::Sender<i8>) };
    let _ = sender.send(code);
}
