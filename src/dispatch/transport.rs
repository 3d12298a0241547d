//! Transport seam for invocations that leave the locality.
//!
//! The wire format is owned by the transport. [`QueueTransport`] keeps
//! outgoing invocations in memory so a simulated peer can pick them up,
//! run them against its own components and complete their continuations.

use super::Invocation;
use crate::error::Error;
use crate::naming::LocalityId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Carries invocations to other localities.
pub trait Transport: Send + Sync + 'static {
    /// Sends `invocation` to `destination`.
    ///
    /// A refused invocation is handed back inside the error; the caller
    /// still owns its completion.
    fn send(&self, destination: LocalityId, invocation: Invocation) -> Result<(), SendError>;
}

/// A refused send, carrying the invocation back to the caller.
#[derive(Debug)]
pub struct SendError {
    /// The invocation that was not accepted.
    pub invocation: Invocation,
    /// Why it was refused.
    pub error: Error,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send of {} refused: {}", self.invocation.action(), self.error)
    }
}

/// In-memory outbox transport.
#[derive(Default)]
pub struct QueueTransport {
    outbox: Mutex<VecDeque<(LocalityId, Invocation)>>,
    closed: AtomicBool,
}

impl QueueTransport {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses every later send, as a severed link would.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once [`QueueTransport::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes the oldest outgoing invocation.
    pub fn pop(&self) -> Option<(LocalityId, Invocation)> {
        self.outbox.lock().pop_front()
    }

    /// Takes the oldest invocation addressed to `destination`.
    pub fn pop_for(&self, destination: LocalityId) -> Option<Invocation> {
        let mut outbox = self.outbox.lock();
        let index = outbox.iter().position(|(to, _)| *to == destination)?;
        outbox.remove(index).map(|(_, inv)| inv)
    }

    /// Takes every outgoing invocation, oldest first.
    pub fn drain(&self) -> Vec<(LocalityId, Invocation)> {
        self.outbox.lock().drain(..).collect()
    }

    /// Returns the number of queued invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbox.lock().is_empty()
    }
}

impl Transport for QueueTransport {
    fn send(&self, destination: LocalityId, invocation: Invocation) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError {
                invocation,
                error: Error::transport_failed(format!("link to {destination} is closed")),
            });
        }
        tracing::trace!(
            destination = %destination,
            action = invocation.action(),
            "queued outgoing invocation"
        );
        self.outbox.lock().push_back((destination, invocation));
        Ok(())
    }
}

impl fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueTransport")
            .field("queued", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
