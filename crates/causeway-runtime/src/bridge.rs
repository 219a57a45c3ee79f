//! Bridge assembly
//!
//! [`Bridge::init`] is the one place a native library gets attached:
//! 1. load the library;
//! 2. verify the full interface contract (all-or-nothing);
//! 3. resolve the buffer helper entry points;
//! 4. hand out the pieces the generated call surface works with.
//!
//! A `Bridge` is an ordinary value: constructed explicitly, dropped
//! explicitly, no process-wide state. Everything it hands out - buffer
//! managers, callback registries - borrows entry points from the loaded
//! library, so the bridge must outlive all traffic created through it;
//! dropping it while calls are still in flight is the same class of error
//! as unloading a shared library that is still executing.

use crate::buffer::{BufferFns, BufferFreeFn, BufferFromBytesFn, BufferManager};
use crate::contract::{verify, ContractTable};
use crate::dispatch::CallbackRegistry;
use crate::error::FatalResult;
use crate::library::NativeLibrary;
use causeway_config::BridgeConfig;

/// An attached native library, ready for traffic
pub struct Bridge {
    buffers: BufferManager,
    runtime: tokio::runtime::Handle,
    // Declared last: entry points resolved from the library must not
    // outlive it, so it is dropped after everything above
    library: NativeLibrary,
}

impl Bridge {
    /// Load, verify, and attach the configured native library
    ///
    /// Any failure - library not found, missing symbol, a single checksum
    /// mismatch - aborts the whole initialization; there is no partially
    /// attached bridge.
    pub fn init(
        config: &BridgeConfig,
        contract: &ContractTable,
        runtime: tokio::runtime::Handle,
    ) -> FatalResult<Self> {
        let library = NativeLibrary::load(config)?;
        verify(&library, contract)?;
        let buffers = BufferManager::new(resolve_buffer_fns(&library, contract.namespace)?);

        tracing::info!(
            path = %library.path().display(),
            namespace = contract.namespace,
            "bridge attached"
        );

        Ok(Self {
            buffers,
            runtime,
            library,
        })
    }

    /// Buffer manager bound to the attached library
    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    /// Runtime that callback dispatch and async drivers run on
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    /// The attached library, for resolving operation entry points
    pub fn library(&self) -> &NativeLibrary {
        &self.library
    }

    /// Construct the registry for one callback interface type
    pub fn callback_registry<I: ?Sized>(&self, interface: &'static str) -> CallbackRegistry<I> {
        CallbackRegistry::new(interface, self.runtime.clone())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("library", &self.library)
            .finish()
    }
}

/// Symbol name of one of the library's buffer helpers
fn buffer_symbol(namespace: &str, which: &str) -> String {
    format!("ffi_{namespace}_buffer_{which}")
}

fn resolve_buffer_fns(library: &NativeLibrary, namespace: &str) -> FatalResult<BufferFns> {
    let from_bytes: BufferFromBytesFn =
        unsafe { library.symbol(&buffer_symbol(namespace, "from_bytes"))? };
    let free: BufferFreeFn = unsafe { library.symbol(&buffer_symbol(namespace, "free"))? };
    Ok(BufferFns { from_bytes, free })
}
