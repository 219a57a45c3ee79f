//! Bridge error taxonomy
//!
//! Two kinds of failure cross the boundary:
//! - a *typed error*: a declared error shape returned deliberately by either
//!   side, recovered into a normal error value;
//! - everything else: faults, protocol violations, lifecycle misuse. These
//!   are fatal - the two sides disagree about the protocol itself, and
//!   recovery would only corrupt state further. They are never downgraded
//!   and never silently swallowed.

use crate::library::LibraryError;
use crate::wire::CodecError;
use thiserror::Error;

/// Unrecoverable bridge failures
#[derive(Debug, Error)]
pub enum FatalError {
    /// The native side trapped with a message
    #[error("native call trapped: {message}")]
    Fault { message: String },

    /// The native side trapped while already handling a trap
    #[error("native call trapped while handling a previous fault")]
    DoubleFault,

    /// Status code outside the protocol - a defect in the bridge itself
    #[error("unknown call status code {code}")]
    UnknownStatusCode { code: i8 },

    /// A native object was used after destroy
    #[error("native object used after destroy")]
    ObjectDestroyed,

    /// The per-object call counter hit its ceiling
    #[error("native object call counter overflow")]
    CounterOverflow,

    /// No entry registered under a handle native code presented
    #[error("no callback registered for handle {handle}")]
    UnknownHandle { handle: u64 },

    /// The loaded library disagrees with the bindings about an operation
    #[error(
        "checksum mismatch for `{operation}`: library reports {actual:#06x}, \
         bindings expect {expected:#06x}"
    )]
    ContractMismatch {
        operation: &'static str,
        expected: u16,
        actual: u16,
    },

    /// An async continuation was dropped without ever firing
    #[error("async continuation dropped without firing")]
    ContinuationDropped,

    /// Wire bytes violated the protocol
    #[error("wire protocol violation: {0}")]
    Codec(#[from] CodecError),

    /// The native library could not be loaded or is missing a symbol
    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Outcome of one boundary call with a declared error type `E`
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The declared error, returned deliberately - recoverable
    #[error("{0}")]
    Typed(E),

    /// Anything else - see [`FatalError`]
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Declared-error slot for operations whose contract has no typed error
///
/// Uninhabited: a status reporting a typed error for such an operation can
/// only be a protocol violation, which the decode path surfaces as
/// [`CodecError::UndeclaredError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoError {}

impl std::fmt::Display for NoError {
    fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {}
    }
}

impl crate::wire::Decode for NoError {
    fn decode(_reader: &mut crate::wire::WireReader<'_>) -> Result<Self, CodecError> {
        Err(CodecError::UndeclaredError)
    }
}

impl CallError<NoError> {
    /// Collapse a no-declared-error outcome into its only possible failure
    pub fn into_fatal(self) -> FatalError {
        match self {
            CallError::Typed(never) => match never {},
            CallError::Fatal(fatal) => fatal,
        }
    }
}

/// Result alias for boundary calls
pub type CallResult<T, E> = Result<T, CallError<E>>;

/// Result alias for bridge-internal operations that cannot fail typed
pub type FatalResult<T> = Result<T, FatalError>;
