//! Call status protocol
//!
//! Every boundary call takes an out-parameter [`CallStatus`] the callee
//! fills in before returning. [`call_with_status`] is the single triage
//! point: every call site goes through it and none may special-case the
//! code values. The protocol:
//! - code 0: success, read the normal return value;
//! - code 1: a declared (typed) error, encoded in the status buffer;
//! - code 2: the callee trapped. The status buffer, if non-empty, carries
//!   the trap message as raw UTF-8 (no length prefix - the buffer length
//!   is the message length). An empty buffer means the callee also failed
//!   to produce a message: the double-fault case, reported distinctly;
//! - anything else: a defect in the bridge itself, always fatal.

use crate::buffer::{BufferManager, FfiBuffer};
use crate::error::{CallError, CallResult, FatalError};
use crate::wire::Decode;

/// The call completed normally
pub const CALL_SUCCESS: i8 = 0;

/// The callee returned its declared error type
pub const CALL_ERROR: i8 = 1;

/// The callee trapped. On results the bridge hands to native code this
/// same code signals an unexpected result shape (a contract violation,
/// distinct from the declared error).
pub const CALL_UNEXPECTED: i8 = 2;

/// Out-parameter filled in by every boundary call
///
/// Created zeroed per call, inspected immediately after the call returns,
/// discarded once the outcome has propagated. Layout is part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: FfiBuffer,
}

impl CallStatus {
    pub fn new() -> Self {
        Self {
            code: CALL_SUCCESS,
            error_buf: FfiBuffer::empty(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CALL_SUCCESS
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one boundary call and triage its status
///
/// `E` is the operation's declared error type; operations that declare none
/// use [`crate::error::NoError`]. Any status buffer is reclaimed on every
/// branch, so this is also where buffer ownership of the error payload
/// comes home.
pub fn call_with_status<T, E, F>(buffers: &BufferManager, call: F) -> CallResult<T, E>
where
    E: Decode,
    F: FnOnce(&mut CallStatus) -> T,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);

    match status.code {
        CALL_SUCCESS => {
            if !status.error_buf.is_empty() {
                drop(buffers.adopt(status.error_buf));
            }
            Ok(value)
        }
        CALL_ERROR => {
            let error: E = buffers.decode(status.error_buf)?;
            Err(CallError::Typed(error))
        }
        CALL_UNEXPECTED => {
            if status.error_buf.is_empty() {
                Err(CallError::Fatal(FatalError::DoubleFault))
            } else {
                let owned = buffers.adopt(status.error_buf);
                let message = String::from_utf8_lossy(owned.as_slice()).into_owned();
                Err(CallError::Fatal(FatalError::Fault { message }))
            }
        }
        code => {
            if !status.error_buf.is_empty() {
                drop(buffers.adopt(status.error_buf));
            }
            Err(CallError::Fatal(FatalError::UnknownStatusCode { code }))
        }
    }
}
