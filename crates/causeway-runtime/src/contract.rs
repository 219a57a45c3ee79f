//! Contract version guard
//!
//! The bindings and the loaded library must agree on the shape of every
//! exposed operation. The library exports one checksum entry point per
//! operation; the bindings carry the values they were generated against.
//! Verification happens once, during bridge initialization, and any single
//! mismatch - or missing checksum symbol - aborts the whole bring-up.
//! There is no partial attach and no renegotiation: a mismatch means the
//! two sides were built from different interface definitions.

use crate::error::{FatalError, FatalResult};
use crate::library::{LibraryError, NativeLibrary};

/// Checksum entry point exported per operation
pub type ChecksumFn = unsafe extern "C" fn() -> u16;

/// One operation's expected checksum and the symbol that reports it
#[derive(Debug, Clone, Copy)]
pub struct OperationChecksum {
    /// Operation name, for diagnostics
    pub operation: &'static str,
    /// Checksum symbol exported by the library
    pub symbol: &'static str,
    /// Value the bindings were generated against
    pub expected: u16,
}

/// The full interface contract the bindings were built from
#[derive(Debug, Clone, Copy)]
pub struct ContractTable {
    /// Namespace the library's helper symbols are prefixed with
    pub namespace: &'static str,
    pub operations: &'static [OperationChecksum],
}

/// Where checksum values come from during verification
///
/// The production source is the loaded [`NativeLibrary`]; tests substitute
/// their own.
pub trait ChecksumSource {
    fn checksum(&self, symbol: &str) -> Result<u16, LibraryError>;
}

impl ChecksumSource for NativeLibrary {
    fn checksum(&self, symbol: &str) -> Result<u16, LibraryError> {
        let entry: ChecksumFn = unsafe { self.symbol(symbol)? };
        Ok(unsafe { entry() })
    }
}

/// Verify every operation's checksum against the source
///
/// Fails on the first missing symbol or mismatch; the caller must treat
/// that as fatal and not bring the bridge up.
pub fn verify(source: &impl ChecksumSource, contract: &ContractTable) -> FatalResult<()> {
    for op in contract.operations {
        let actual = source.checksum(op.symbol).map_err(FatalError::Library)?;
        if actual != op.expected {
            tracing::error!(
                operation = op.operation,
                expected = op.expected,
                actual,
                "contract checksum mismatch"
            );
            return Err(FatalError::ContractMismatch {
                operation: op.operation,
                expected: op.expected,
                actual,
            });
        }
        tracing::trace!(operation = op.operation, "checksum verified");
    }

    tracing::debug!(
        namespace = contract.namespace,
        operations = contract.operations.len(),
        "contract verified"
    );
    Ok(())
}
