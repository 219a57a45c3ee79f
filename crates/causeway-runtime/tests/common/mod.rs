//! A fake native ledger library, implemented in-process
//!
//! Plays the native side of the boundary for integration tests: buffer
//! helpers, a session object with clone/free bookkeeping, a sync and an
//! async submit operation, checksum entry points, and a callback vtable
//! registration entry. Counters live inside the fixture objects themselves
//! so parallel tests never observe each other.

#![allow(dead_code)]

use causeway_runtime::dispatch::{DispatchCompleteFn, ForeignFuture, VtableInitFn};
use causeway_runtime::future::{ContinuationFn, FutureHandle, FutureVtable, POLL_READY, POLL_WAKE};
use causeway_runtime::wire::{CodecError, Decode, Encode, WireReader, WireWriter};
use causeway_runtime::{
    BufferFns, BufferManager, ByteSpan, CallStatus, ChecksumSource, ContractTable, FfiBuffer,
    LibraryError, ObjectVtable, OperationChecksum, CALL_ERROR, CALL_SUCCESS,
};
use std::ffi::c_void;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

// ===== Records (the generated data-class catalog stands in here) =====

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount_msat: u64,
    pub memo: Option<String>,
}

impl Encode for PaymentRequest {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        self.reference.encode(writer)?;
        self.amount_msat.encode(writer)?;
        self.memo.encode(writer)
    }
}

impl Decode for PaymentRequest {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            reference: String::decode(reader)?,
            amount_msat: u64::decode(reader)?,
            memo: Option::<String>::decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub id: String,
    pub fee_msat: u64,
}

impl Encode for PaymentReceipt {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        self.id.encode(writer)?;
        self.fee_msat.encode(writer)
    }
}

impl Decode for PaymentReceipt {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: String::decode(reader)?,
            fee_msat: u64::decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    InsufficientFunds { available_msat: u64 },
    Rejected { reason: String },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InsufficientFunds { available_msat } => {
                write!(f, "insufficient funds: {available_msat} msat available")
            }
            LedgerError::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

impl Encode for LedgerError {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        match self {
            LedgerError::InsufficientFunds { available_msat } => {
                writer.write_enum_index(0);
                available_msat.encode(writer)
            }
            LedgerError::Rejected { reason } => {
                writer.write_enum_index(1);
                reason.encode(writer)
            }
        }
    }
}

impl Decode for LedgerError {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        match reader.read_enum_index()? {
            0 => Ok(LedgerError::InsufficientFunds {
                available_msat: u64::decode(reader)?,
            }),
            1 => Ok(LedgerError::Rejected {
                reason: String::decode(reader)?,
            }),
            index => Err(CodecError::InvalidEnumIndex { index }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub dedupe_key: String,
}

impl Encode for Ack {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        self.dedupe_key.encode(writer)
    }
}

impl Decode for Ack {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            dedupe_key: String::decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    Unavailable,
    Rejected { reason: String },
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Unavailable => write!(f, "sink unavailable"),
            SinkError::Rejected { reason } => write!(f, "sink rejected: {reason}"),
        }
    }
}

impl Encode for SinkError {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        match self {
            SinkError::Unavailable => {
                writer.write_enum_index(0);
                Ok(())
            }
            SinkError::Rejected { reason } => {
                writer.write_enum_index(1);
                reason.encode(writer)
            }
        }
    }
}

impl Decode for SinkError {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        match reader.read_enum_index()? {
            0 => Ok(SinkError::Unavailable),
            1 => Ok(SinkError::Rejected {
                reason: String::decode(reader)?,
            }),
            index => Err(CodecError::InvalidEnumIndex { index }),
        }
    }
}

// ===== Buffer helper entry points =====

pub fn buffer_from_vec(mut bytes: Vec<u8>) -> FfiBuffer {
    let raw = FfiBuffer {
        capacity: bytes.capacity() as u64,
        len: bytes.len() as u64,
        data: bytes.as_mut_ptr(),
    };
    std::mem::forget(bytes);
    raw
}

pub unsafe extern "C" fn buffer_from_bytes(span: ByteSpan, _status: *mut CallStatus) -> FfiBuffer {
    let bytes = if span.len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(span.data, span.len as usize) }.to_vec()
    };
    buffer_from_vec(bytes)
}

pub unsafe extern "C" fn buffer_free(buf: FfiBuffer, _status: *mut CallStatus) {
    if !buf.data.is_null() {
        unsafe {
            drop(Vec::from_raw_parts(
                buf.data,
                buf.len as usize,
                buf.capacity as usize,
            ));
        }
    }
}

pub fn buffer_fns() -> BufferFns {
    BufferFns {
        from_bytes: buffer_from_bytes,
        free: buffer_free,
    }
}

pub fn manager() -> BufferManager {
    BufferManager::new(buffer_fns())
}

/// Take ownership of an argument buffer the host lowered, native-side
fn consume_buffer(buf: FfiBuffer) -> Vec<u8> {
    let bytes = unsafe { buf.as_slice() }.to_vec();
    let mut status = CallStatus::new();
    unsafe { buffer_free(buf, &mut status) };
    bytes
}

// ===== Ledger session object =====

/// The native resource behind a session proxy
///
/// Reference bookkeeping mirrors the real contract: the proxy owns one
/// reference, every clone adds one, every call consumes the clone it was
/// given, and the final release frees the resource.
pub struct LedgerSession {
    pub balance_msat: AtomicI64,
    pub refs: AtomicI64,
    pub frees: AtomicUsize,
    pub submissions: AtomicUsize,
}

impl LedgerSession {
    pub fn new(balance_msat: u64) -> Box<Self> {
        Box::new(Self {
            balance_msat: AtomicI64::new(balance_msat as i64),
            refs: AtomicI64::new(1),
            frees: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
        })
    }

    pub fn as_ptr(&self) -> *const c_void {
        self as *const Self as *const c_void
    }

    fn release_ref(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub unsafe extern "C" fn session_clone(
    ptr: *const c_void,
    _status: *mut CallStatus,
) -> *const c_void {
    let session = unsafe { &*(ptr as *const LedgerSession) };
    session.refs.fetch_add(1, Ordering::SeqCst);
    ptr
}

pub unsafe extern "C" fn session_free(ptr: *const c_void, _status: *mut CallStatus) {
    let session = unsafe { &*(ptr as *const LedgerSession) };
    session.release_ref();
}

pub const SESSION_VTABLE: ObjectVtable = ObjectVtable {
    clone: session_clone,
    free: session_free,
};

/// Synchronous submit: debits the balance or reports a typed error
pub unsafe extern "C" fn session_submit(
    ptr: *const c_void,
    request: FfiBuffer,
    status: *mut CallStatus,
) -> FfiBuffer {
    let session = unsafe { &*(ptr as *const LedgerSession) };
    let status = unsafe { &mut *status };
    let bytes = consume_buffer(request);
    let request: PaymentRequest =
        causeway_runtime::wire::decode_from_slice(&bytes).expect("malformed request");

    let result = submit_outcome(session, &request);
    session.release_ref();

    match result {
        Ok(receipt) => {
            status.code = CALL_SUCCESS;
            buffer_from_vec(causeway_runtime::wire::encode_to_vec(&receipt).unwrap())
        }
        Err(error) => {
            status.code = CALL_ERROR;
            status.error_buf =
                buffer_from_vec(causeway_runtime::wire::encode_to_vec(&error).unwrap());
            FfiBuffer::empty()
        }
    }
}

fn submit_outcome(
    session: &LedgerSession,
    request: &PaymentRequest,
) -> Result<PaymentReceipt, LedgerError> {
    let amount = request.amount_msat as i64;
    let mut balance = session.balance_msat.load(Ordering::SeqCst);
    loop {
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                available_msat: balance as u64,
            });
        }
        match session.balance_msat.compare_exchange(
            balance,
            balance - amount,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => break,
            Err(actual) => balance = actual,
        }
    }
    session.submissions.fetch_add(1, Ordering::SeqCst);
    Ok(PaymentReceipt {
        id: format!("pay-{}", request.reference),
        fee_msat: 12,
    })
}

// ===== Async submit operation =====

/// Native-side state of one in-flight async submission
pub struct AsyncSubmission {
    wakes_before_ready: AtomicUsize,
    outcome: Mutex<Option<Result<PaymentReceipt, LedgerError>>>,
    pub polls: AtomicUsize,
    pub completes: AtomicUsize,
    pub frees: AtomicUsize,
}

impl AsyncSubmission {
    pub fn from_handle<'a>(handle: FutureHandle) -> &'a Self {
        unsafe { &*(handle as *const Self) }
    }
}

/// Begin an async submit; returns the operation handle
pub unsafe extern "C" fn session_submit_async(
    ptr: *const c_void,
    request: FfiBuffer,
    _status: *mut CallStatus,
) -> FutureHandle {
    let session = unsafe { &*(ptr as *const LedgerSession) };
    let bytes = consume_buffer(request);
    let request: PaymentRequest =
        causeway_runtime::wire::decode_from_slice(&bytes).expect("malformed request");

    let outcome = submit_outcome(session, &request);
    session.release_ref();

    let submission = Box::new(AsyncSubmission {
        wakes_before_ready: AtomicUsize::new(2),
        outcome: Mutex::new(Some(outcome)),
        polls: AtomicUsize::new(0),
        completes: AtomicUsize::new(0),
        frees: AtomicUsize::new(0),
    });
    Box::leak(submission) as *const AsyncSubmission as FutureHandle
}

pub unsafe extern "C" fn submission_poll(handle: FutureHandle, cont: ContinuationFn, data: u64) {
    let submission = AsyncSubmission::from_handle(handle);
    submission.polls.fetch_add(1, Ordering::SeqCst);
    let code = if submission
        .wakes_before_ready
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        POLL_WAKE
    } else {
        POLL_READY
    };
    unsafe { cont(data, code) };
}

pub unsafe extern "C" fn submission_complete(
    handle: FutureHandle,
    status: *mut CallStatus,
) -> FfiBuffer {
    let submission = AsyncSubmission::from_handle(handle);
    submission.completes.fetch_add(1, Ordering::SeqCst);
    let status = unsafe { &mut *status };
    match submission
        .outcome
        .lock()
        .unwrap()
        .take()
        .expect("complete called twice")
    {
        Ok(receipt) => {
            status.code = CALL_SUCCESS;
            buffer_from_vec(causeway_runtime::wire::encode_to_vec(&receipt).unwrap())
        }
        Err(error) => {
            status.code = CALL_ERROR;
            status.error_buf =
                buffer_from_vec(causeway_runtime::wire::encode_to_vec(&error).unwrap());
            FfiBuffer::empty()
        }
    }
}

pub unsafe extern "C" fn submission_free(handle: FutureHandle) {
    let submission = AsyncSubmission::from_handle(handle);
    submission.frees.fetch_add(1, Ordering::SeqCst);
}

pub const SUBMISSION_VTABLE: FutureVtable<FfiBuffer> = FutureVtable {
    poll: submission_poll,
    complete: submission_complete,
    free: submission_free,
};

// ===== Callback vtable registration =====

/// The fixed-layout table native code calls host event sinks through
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EventSinkVtable {
    pub on_settled: unsafe extern "C" fn(
        handle: u64,
        receipt: FfiBuffer,
        complete: DispatchCompleteFn,
        callback_data: u64,
        out_future: *mut ForeignFuture,
    ),
    pub free: unsafe extern "C" fn(handle: u64),
}

static EVENT_SINK_VTABLE: Mutex<Option<EventSinkVtable>> = Mutex::new(None);

/// The library's registration entry point for the event sink interface
pub unsafe extern "C" fn init_event_sink_vtable(
    vtable: *const EventSinkVtable,
    _status: *mut CallStatus,
) {
    *EVENT_SINK_VTABLE.lock().unwrap() = Some(unsafe { *vtable });
}

pub const INIT_EVENT_SINK_VTABLE: VtableInitFn<EventSinkVtable> = init_event_sink_vtable;

/// The native side firing an event at a registered host sink
pub fn native_emit_settled(
    handle: u64,
    receipt: &PaymentReceipt,
    complete: DispatchCompleteFn,
    callback_data: u64,
) -> ForeignFuture {
    let vtable = EVENT_SINK_VTABLE
        .lock()
        .unwrap()
        .expect("event sink vtable not registered");
    let receipt_buf = buffer_from_vec(causeway_runtime::wire::encode_to_vec(receipt).unwrap());
    let mut out = ForeignFuture {
        handle: 0,
        free: noop_future_free,
    };
    unsafe { (vtable.on_settled)(handle, receipt_buf, complete, callback_data, &mut out) };
    out
}

unsafe extern "C" fn noop_future_free(_handle: u64) {}

/// The native side declaring it will make no further calls on a handle
pub fn native_release_sink(handle: u64) {
    let vtable = EVENT_SINK_VTABLE
        .lock()
        .unwrap()
        .expect("event sink vtable not registered");
    unsafe { (vtable.free)(handle) };
}

// ===== Checksums =====

pub unsafe extern "C" fn checksum_session_submit() -> u16 {
    0x60D4
}

pub unsafe extern "C" fn checksum_session_submit_async() -> u16 {
    0x2F11
}

pub unsafe extern "C" fn checksum_event_sink_on_settled() -> u16 {
    0x9A03
}

pub const CONTRACT: ContractTable = ContractTable {
    namespace: "ledger",
    operations: &[
        OperationChecksum {
            operation: "session_submit",
            symbol: "checksum_ledger_session_submit",
            expected: 0x60D4,
        },
        OperationChecksum {
            operation: "session_submit_async",
            symbol: "checksum_ledger_session_submit_async",
            expected: 0x2F11,
        },
        OperationChecksum {
            operation: "event_sink_on_settled",
            symbol: "checksum_ledger_event_sink_on_settled",
            expected: 0x9A03,
        },
    ],
};

/// Checksum lookup over the fixture's entry points
pub struct FixtureChecksums;

impl ChecksumSource for FixtureChecksums {
    fn checksum(&self, symbol: &str) -> Result<u16, LibraryError> {
        let value = match symbol {
            "checksum_ledger_session_submit" => unsafe { checksum_session_submit() },
            "checksum_ledger_session_submit_async" => unsafe { checksum_session_submit_async() },
            "checksum_ledger_event_sink_on_settled" => unsafe {
                checksum_event_sink_on_settled()
            },
            _ => {
                return Err(LibraryError::SymbolNotFound {
                    library: "ledger-fixture".to_string(),
                    symbol: symbol.to_string(),
                })
            }
        };
        Ok(value)
    }
}
