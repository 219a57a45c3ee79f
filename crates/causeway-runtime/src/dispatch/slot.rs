//! Completion slot with cancellation
//!
//! One callback invocation produces at most one result, which at most one
//! consumer delivers - unless the caller cancels first. That is a
//! single-producer/single-consumer slot raced against a distinct
//! cancellation signal:
//! - publishing after the consumer gave up hands the value back to the
//!   producer for disposal;
//! - cancelling after the value was consumed is a no-op race loss;
//! - a cancellation handle dropped without firing never cancels anything.

use tokio::sync::oneshot;

/// Producer half: publishes the single result
pub struct SlotPublisher<T> {
    sender: oneshot::Sender<T>,
}

impl<T> SlotPublisher<T> {
    /// Publish the result; on a lost race the value comes back for disposal
    pub fn publish(self, value: T) -> Result<(), T> {
        self.sender.send(value)
    }
}

/// Consumer half: receives the single result
pub struct SlotConsumer<T> {
    receiver: oneshot::Receiver<T>,
}

/// Create a one-shot completion slot
pub fn completion_slot<T>() -> (SlotPublisher<T>, SlotConsumer<T>) {
    let (sender, receiver) = oneshot::channel();
    (SlotPublisher { sender }, SlotConsumer { receiver })
}

/// Fires the cancellation signal
pub struct CancelHandle {
    sender: oneshot::Sender<()>,
}

impl CancelHandle {
    /// Request cancellation; harmless if the race is already decided
    pub fn cancel(self) {
        let _ = self.sender.send(());
    }
}

/// Observed by the racing wait
pub struct CancelSignal {
    receiver: oneshot::Receiver<()>,
}

/// Create a cancellation pair
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = oneshot::channel();
    (CancelHandle { sender }, CancelSignal { receiver })
}

/// How the race resolved
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The result arrived before any cancellation
    Completed(T),
    /// Cancellation won, or the producer vanished without publishing
    Cancelled,
}

/// Wait for the result or the cancellation signal, whichever fires first
///
/// Checked in order: a cancellation that has already fired wins even if the
/// result is also ready, so a callback is never delivered once the caller
/// has observed its own cancel request.
pub async fn race<T>(consumer: SlotConsumer<T>, cancel: CancelSignal) -> Outcome<T> {
    let mut result = consumer.receiver;
    let mut cancelled = cancel.receiver;

    tokio::select! {
        biased;
        fired = &mut cancelled => {
            if fired.is_ok() {
                return Outcome::Cancelled;
            }
            // The cancel handle was dropped without firing: cancellation can
            // no longer happen, so wait out the result
            match result.await {
                Ok(value) => Outcome::Completed(value),
                Err(_) => Outcome::Cancelled,
            }
        }
        value = &mut result => match value {
            Ok(value) => Outcome::Completed(value),
            Err(_) => Outcome::Cancelled,
        },
    }
}
