//! Causeway Runtime - host-side FFI bridge
//!
//! Causeway lets host code call a compiled native library through a stable
//! byte-buffer calling convention, and lets that library call back into
//! host implementations of declared interfaces. This crate is the bridge
//! runtime only; the per-operation call surface is generated on top of it.
//!
//! - [`wire`]: binary codec for everything that crosses the boundary
//! - [`buffer`]: buffer ownership, exactly-once free
//! - [`status`]: the tri-state call status protocol
//! - [`object`]: native object proxies with lock-free call counting
//! - [`future`]: the poll/continuation driver for async operations
//! - [`dispatch`]: callback registries and native-to-host dispatch
//! - [`contract`]: the load-time checksum guard
//! - [`library`], [`bridge`]: loading and assembly
//!
//! # Safety
//!
//! Every boundary crossing is `unsafe` at the bottom; this crate isolates
//! that in the modules above and exposes ownership-enforcing wrappers.

/// Causeway runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bridge;
pub mod buffer;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod library;
pub mod object;
pub mod status;
pub mod wire;


// Re-export commonly used types
pub use bridge::Bridge;
pub use buffer::{BufferFns, BufferManager, ByteSpan, FfiBuffer, OwnedBuffer};
pub use contract::{ChecksumSource, ContractTable, OperationChecksum};
pub use dispatch::{CallbackRegistry, DispatchResult, ForeignFuture, HandleTable};
pub use error::{CallError, CallResult, FatalError, FatalResult, NoError};
pub use future::{drive, FutureHandle, FutureVtable};
pub use library::{LibraryError, NativeLibrary};
pub use object::{NativeObject, ObjectRef, ObjectVtable};
pub use status::{call_with_status, CallStatus, CALL_ERROR, CALL_SUCCESS, CALL_UNEXPECTED};
pub use wire::{decode_from_slice, encode_to_vec, CodecError, Decode, Encode};
