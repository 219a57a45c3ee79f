//! Callback registries
//!
//! Native code invokes host implementations of a declared interface through
//! opaque handles. A [`CallbackRegistry`] is the per-interface table behind
//! those handles: explicitly constructed, owned by whoever assembles the
//! bridge, and torn down with it - never a process-wide singleton.

use crate::dispatch::handles::HandleTable;
use crate::error::FatalResult;
use std::sync::Arc;

/// Registry of host implementations for one callback interface type
pub struct CallbackRegistry<I: ?Sized> {
    interface: &'static str,
    table: HandleTable<Arc<I>>,
    runtime: tokio::runtime::Handle,
}

impl<I: ?Sized> CallbackRegistry<I> {
    /// Create a registry for one interface type
    ///
    /// Dispatched invocations run as tasks on the given runtime.
    pub fn new(interface: &'static str, runtime: tokio::runtime::Handle) -> Self {
        Self {
            interface,
            table: HandleTable::new(),
            runtime,
        }
    }

    /// Register an implementation, handing out the handle native code will
    /// present on every invocation
    pub fn register(&self, implementation: Arc<I>) -> u64 {
        let handle = self.table.insert(implementation);
        tracing::debug!(interface = self.interface, handle, "registered callback");
        handle
    }

    /// Resolve a handle presented by native code
    ///
    /// A miss is fatal: the native side holds a handle the host never
    /// issued, or one it already freed.
    pub fn resolve(&self, handle: u64) -> FatalResult<Arc<I>> {
        self.table.get(handle)
    }

    /// Release a handle native code will make no further calls through
    ///
    /// Invoked from the interface's `free` dispatch entry point. Releasing
    /// an unknown handle is a double-free and therefore fatal.
    pub fn unregister(&self, handle: u64) -> FatalResult<()> {
        self.table.remove(handle)?;
        tracing::debug!(interface = self.interface, handle, "released callback");
        Ok(())
    }

    /// Name of the interface this registry serves
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Runtime that dispatched invocations run on
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<I: ?Sized> std::fmt::Debug for CallbackRegistry<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("interface", &self.interface)
            .field("registered", &self.len())
            .finish()
    }
}
