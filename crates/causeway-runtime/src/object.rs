//! Native object proxies
//!
//! A [`NativeObject`] is the host-side handle to a resource that lives
//! inside the native library. The library exports a `clone`/`free` pair per
//! object type; the proxy layers a lock-free call counter on top so that:
//! - any number of concurrent callers may use the object,
//! - the native resource is freed exactly once, the instant the last user
//!   releases it - even when that user is racing an explicit `destroy`.
//!
//! The counter is the object's state machine: `>= 0` while live, exactly
//! `-1` once destroyed, one-way, no reentry. It stays lock-free because it
//! sits on the hottest path in the bridge (every call that touches a native
//! object goes through [`NativeObject::acquire`]).

use crate::error::{FatalError, FatalResult};
use crate::status::CallStatus;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Obtain an additional reference to the native resource for one call
pub type ObjectCloneFn = unsafe extern "C" fn(*const c_void, *mut CallStatus) -> *const c_void;

/// Release the native resource
pub type ObjectFreeFn = unsafe extern "C" fn(*const c_void, *mut CallStatus);

/// The per-type lifetime entry points the library exports
#[derive(Debug, Clone, Copy)]
pub struct ObjectVtable {
    pub clone: ObjectCloneFn,
    pub free: ObjectFreeFn,
}

/// Counter value marking the destroyed state
const DESTROYED: i64 = -1;

/// Host-side proxy for a native resource
pub struct NativeObject {
    ptr: *const c_void,
    call_counter: AtomicI64,
    destroyed: AtomicBool,
    vtable: ObjectVtable,
}

// Safety: the pointer is an opaque token owned by the native library, which
// must support concurrent calls on it (thread-pool runtime); all host-side
// mutation goes through atomics.
unsafe impl Send for NativeObject {}
unsafe impl Sync for NativeObject {}

impl NativeObject {
    /// Wrap a pointer the library just handed over
    ///
    /// # Safety
    ///
    /// `ptr` must be a live object pointer of the type `vtable` belongs to,
    /// with ownership of one reference transferred to the proxy.
    pub unsafe fn from_raw(ptr: *const c_void, vtable: ObjectVtable) -> Self {
        Self {
            ptr,
            call_counter: AtomicI64::new(0),
            destroyed: AtomicBool::new(false),
            vtable,
        }
    }

    /// Enter a call on the object
    ///
    /// Atomically increments the call counter (compare-and-swap retry, only
    /// while the counter is still `>= 0`), then clones a call-scoped native
    /// pointer. The returned guard releases the counter on drop; the cloned
    /// pointer itself is consumed by the native call it is passed to.
    pub fn acquire(&self) -> FatalResult<ObjectRef<'_>> {
        let mut current = self.call_counter.load(Ordering::SeqCst);
        loop {
            if current < 0 {
                return Err(FatalError::ObjectDestroyed);
            }
            if current == i64::MAX {
                return Err(FatalError::CounterOverflow);
            }
            match self.call_counter.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let mut status = CallStatus::new();
        let cloned = unsafe { (self.vtable.clone)(self.ptr, &mut status) };
        if !status.is_success() {
            self.release();
            return Err(FatalError::Fault {
                message: format!("object clone reported status {}", status.code),
            });
        }

        Ok(ObjectRef {
            object: self,
            ptr: cloned,
        })
    }

    /// Leave a call; the decrement that lands on -1 frees the resource
    fn release(&self) {
        let previous = self.call_counter.fetch_sub(1, Ordering::SeqCst);
        if previous == 0 {
            self.free_resource();
        }
    }

    /// Tear the object down
    ///
    /// Idempotent: the destroyed flag is checked-and-set atomically, and
    /// only the winning caller performs the extra decrement that pushes the
    /// counter toward -1. Callers still inside `acquire` guards keep the
    /// resource alive until the last of them releases.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.release();
        }
    }

    /// Whether destroy has been requested
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn free_resource(&self) {
        tracing::trace!(ptr = ?self.ptr, "releasing native object");
        let mut status = CallStatus::new();
        unsafe { (self.vtable.free)(self.ptr, &mut status) };
        if !status.is_success() {
            tracing::error!(code = status.code, "native object free reported status");
        }
    }
}

impl Drop for NativeObject {
    /// Safety net for callers that never called [`NativeObject::destroy`]
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeObject")
            .field("ptr", &self.ptr)
            .field("call_counter", &self.call_counter.load(Ordering::SeqCst))
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

/// One call's scoped use of a native object
///
/// Holds the call counter up while in scope. The cloned pointer is valid
/// for exactly one native call, which consumes it.
pub struct ObjectRef<'a> {
    object: &'a NativeObject,
    ptr: *const c_void,
}

impl ObjectRef<'_> {
    /// The call-scoped native pointer to pass across the boundary
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr
    }
}

impl Drop for ObjectRef<'_> {
    fn drop(&mut self) {
        self.object.release();
    }
}
