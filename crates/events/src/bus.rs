//! Event queue abstraction (mechanics only).
//!
//! Unlike a pub/sub bus this models the engine's actual shape: many
//! producers (probes, the submission service), exactly one consumer (the
//! event dispatcher). `subscribe` hands out the single receiving end once;
//! a second call gets `None` rather than a second, independently-fed copy
//! of the stream.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

/// The single consumer's handle onto the queue.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available, or the bus is closed.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Take a message if one is already queued, without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Bounded, single-consumer event queue.
///
/// A full queue means the dispatcher has fallen behind; `try_put` fails
/// fast rather than blocking the probe or submission thread that called it.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Enqueue a message without blocking. Fails if the queue is full.
    fn try_put(&self, message: M) -> Result<(), Self::Error>;

    /// Take the single receiving end of the queue. Returns `None` if it has
    /// already been taken by an earlier call.
    fn subscribe(&self) -> Option<Subscription<M>>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn try_put(&self, message: M) -> Result<(), Self::Error> {
        (**self).try_put(message)
    }

    fn subscribe(&self) -> Option<Subscription<M>> {
        (**self).subscribe()
    }
}
