//! Dispatch entry points - native code calling host implementations
//!
//! Per-method dispatch works in four steps:
//! 1. native code calls the method's dispatch entry point with a handle,
//!    encoded arguments, and a completion callback;
//! 2. the registry resolves the handle (a miss is fatal);
//! 3. the entry point immediately hands back a [`ForeignFuture`] token,
//!    decoupling native code from the host execution's timing;
//! 4. two tasks run: one executes the host implementation and publishes its
//!    encoded result, the other races that against cancellation and either
//!    invokes the completion callback or - on cancellation - invokes
//!    nothing at all.
//!
//! Error translation at this edge: the declared error type is encoded and
//! reported with the typed-error status; a panic or any other unrecognized
//! shape is reported with the unexpected-result status, so native code
//! never mistakes a contract violation for a handled business error.

use crate::buffer::{BufferManager, FfiBuffer};
use crate::dispatch::registry::CallbackRegistry;
use crate::dispatch::slot::{cancellation, completion_slot, race, CancelHandle, Outcome};
use crate::error::{CallError, FatalResult, NoError};
use crate::status::{call_with_status, CallStatus, CALL_ERROR, CALL_SUCCESS, CALL_UNEXPECTED};
use crate::wire::Encode;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Token returned to native code for one in-flight dispatch
///
/// Native code calls `free(handle)` exactly once per token: before the
/// completion callback fires it cancels the invocation (the callback will
/// then never fire); afterwards it merely releases the token.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignFuture {
    pub handle: u64,
    pub free: unsafe extern "C" fn(u64),
}

/// The completion payload delivered to native code
///
/// Mirrors the outbound call protocol: a status plus a result buffer, so
/// both directions triage outcomes identically.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DispatchResult {
    pub return_buf: FfiBuffer,
    pub status: CallStatus,
}

/// Completion callback supplied by native code with each dispatch
pub type DispatchCompleteFn = unsafe extern "C" fn(callback_data: u64, result: DispatchResult);

/// Entry point registering a callback interface's vtable with the library
pub type VtableInitFn<V> = unsafe extern "C" fn(*const V, *mut CallStatus);

/// A published result that has not yet been delivered to native code
///
/// Owns the buffers inside the raw [`DispatchResult`]; if the race is lost
/// to cancellation the drop reclaims them, otherwise [`PendingResult::into_raw`]
/// transfers them to native code along with the callback.
struct PendingResult {
    raw: DispatchResult,
    buffers: BufferManager,
}

// Safety: the buffers inside `raw` are owned exclusively by this value
// until drop or into_raw, and the helper entry points are callable from
// any thread.
unsafe impl Send for PendingResult {}

impl PendingResult {
    fn success(buffers: &BufferManager, return_buf: FfiBuffer) -> Self {
        Self {
            raw: DispatchResult {
                return_buf,
                status: CallStatus {
                    code: CALL_SUCCESS,
                    error_buf: FfiBuffer::empty(),
                },
            },
            buffers: buffers.clone(),
        }
    }

    fn typed_error(buffers: &BufferManager, error_buf: FfiBuffer) -> Self {
        Self {
            raw: DispatchResult {
                return_buf: FfiBuffer::empty(),
                status: CallStatus {
                    code: CALL_ERROR,
                    error_buf,
                },
            },
            buffers: buffers.clone(),
        }
    }

    fn unexpected(buffers: &BufferManager, message: String) -> Self {
        let error_buf = buffers
            .allocate(message.as_bytes())
            .map(crate::buffer::OwnedBuffer::into_raw)
            .unwrap_or_else(|_| FfiBuffer::empty());
        Self {
            raw: DispatchResult {
                return_buf: FfiBuffer::empty(),
                status: CallStatus {
                    code: CALL_UNEXPECTED,
                    error_buf,
                },
            },
            buffers: buffers.clone(),
        }
    }

    /// Translate one host-side outcome into the wire shape
    fn from_outcome<R: Encode, E: Encode>(
        buffers: &BufferManager,
        outcome: Result<Result<R, E>, Box<dyn std::any::Any + Send>>,
    ) -> Self {
        match outcome {
            Ok(Ok(value)) => match buffers.encode(&value) {
                Ok(owned) => Self::success(buffers, owned.into_raw()),
                Err(fatal) => Self::unexpected(buffers, fatal.to_string()),
            },
            Ok(Err(declared)) => match buffers.encode(&declared) {
                Ok(owned) => Self::typed_error(buffers, owned.into_raw()),
                Err(fatal) => Self::unexpected(buffers, fatal.to_string()),
            },
            Err(panic) => Self::unexpected(buffers, panic_message(panic)),
        }
    }

    /// Hand the raw result (and its buffers) over to native code
    fn into_raw(self) -> DispatchResult {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl Drop for PendingResult {
    fn drop(&mut self) {
        // Undelivered: reclaim whatever the result was carrying
        if !self.raw.return_buf.is_empty() {
            drop(self.buffers.adopt(self.raw.return_buf));
        }
        if !self.raw.status.error_buf.is_empty() {
            drop(self.buffers.adopt(self.raw.status.error_buf));
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback implementation panicked".to_string()
    }
}

/// Run one callback method invocation
///
/// This is the body every per-method dispatch entry point delegates to:
/// `invoke` receives the resolved implementation and produces its
/// `Result<R, E>` on the registry's runtime, while native code gets the
/// [`ForeignFuture`] token back immediately.
pub fn dispatch_call<I, F, Fut, R, E>(
    registry: &CallbackRegistry<I>,
    buffers: &BufferManager,
    handle: u64,
    invoke: F,
    complete: DispatchCompleteFn,
    callback_data: u64,
) -> FatalResult<ForeignFuture>
where
    I: ?Sized + Send + Sync + 'static,
    F: FnOnce(Arc<I>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Encode,
    E: Encode,
{
    let implementation = registry.resolve(handle)?;

    let (publisher, consumer) = completion_slot::<PendingResult>();
    let (cancel_handle, cancel_signal) = cancellation();

    let producer_buffers = buffers.clone();
    registry.runtime().spawn(async move {
        let outcome = AssertUnwindSafe(invoke(implementation)).catch_unwind().await;
        let result = PendingResult::from_outcome(&producer_buffers, outcome);
        // A lost race hands the result back; dropping it reclaims buffers
        let _ = publisher.publish(result);
    });

    registry.runtime().spawn(async move {
        match race(consumer, cancel_signal).await {
            Outcome::Completed(pending) => unsafe { complete(callback_data, pending.into_raw()) },
            Outcome::Cancelled => {
                tracing::trace!("dispatch cancelled before delivery");
            }
        }
    });

    let token = Box::into_raw(Box::new(cancel_handle)) as u64;
    Ok(ForeignFuture {
        handle: token,
        free: foreign_future_free,
    })
}

/// The `free` half of every [`ForeignFuture`] token
///
/// # Safety
///
/// `token` must be the handle of a [`ForeignFuture`] returned by
/// [`dispatch_call`], freed exactly once.
pub unsafe extern "C" fn foreign_future_free(token: u64) {
    let handle = unsafe { Box::from_raw(token as *mut CancelHandle) };
    (*handle).cancel();
}

/// Register a callback interface's vtable with the library
///
/// Called once per interface type during bridge initialization; the vtable
/// must live for the rest of the process, which is why a `'static`
/// reference is required.
pub fn register_vtable<V>(
    buffers: &BufferManager,
    init: VtableInitFn<V>,
    vtable: &'static V,
) -> FatalResult<()> {
    let result: Result<(), CallError<NoError>> =
        call_with_status(buffers, |status| unsafe { init(vtable, status) });
    result.map_err(CallError::into_fatal)
}
