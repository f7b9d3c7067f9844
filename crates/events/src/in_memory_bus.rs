//! Bounded, single-consumer event queue backing the dispatcher.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Mutex;

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum QueueError {
    /// The queue is full; the caller should log and drop the event.
    Full,
    /// The single consumer has been dropped and will never drain it again.
    Closed,
}

/// Bounded FIFO queue with a single producer-side handle shared across
/// threads and exactly one consumer.
///
/// Built on `std::sync::mpsc::sync_channel`, which already gives the
/// bounded-capacity, non-blocking-try-send semantics this needs; the
/// `Mutex<Option<_>>` around the receiver just enforces "subscribe once".
#[derive(Debug)]
pub struct BoundedEventQueue<M> {
    sender: SyncSender<M>,
    receiver: Mutex<Option<mpsc::Receiver<M>>>,
}

impl<M> BoundedEventQueue<M> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl<M> EventBus<M> for BoundedEventQueue<M>
where
    M: Send + 'static,
{
    type Error = QueueError;

    fn try_put(&self, message: M) -> Result<(), Self::Error> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Closed,
        })
    }

    fn subscribe(&self) -> Option<Subscription<M>> {
        let mut slot = self.receiver.lock().ok()?;
        slot.take().map(Subscription::new)
    }
}
