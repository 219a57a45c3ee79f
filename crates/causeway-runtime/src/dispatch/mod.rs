//! Callback dispatch - the reverse direction of the bridge
//!
//! Native code holds opaque integer handles standing in for host
//! implementations of declared interfaces:
//! - [`HandleTable`]: opaque ids with concurrent lookup
//! - [`CallbackRegistry`]: the per-interface table of implementations
//! - completion slot + cancellation signal primitives ([`slot`])
//! - per-method dispatch entry machinery ([`foreign`])

pub mod foreign;
pub mod handles;
pub mod registry;
pub mod slot;

pub use foreign::{
    dispatch_call, foreign_future_free, register_vtable, DispatchCompleteFn, DispatchResult,
    ForeignFuture, VtableInitFn,
};
pub use handles::HandleTable;
pub use registry::CallbackRegistry;
pub use slot::{
    cancellation, completion_slot, race, CancelHandle, CancelSignal, Outcome, SlotConsumer,
    SlotPublisher,
};
