//! Completion delivery.
//!
//! A [`Continuation`] travels with every dispatched invocation and is how
//! whoever ran the action (a local worker, or the context that received a
//! remote reply) hands the outcome back to the waiting future. It exposes
//! exactly two deliveries, success with a value and failure with an error,
//! and both end in the single-write transition of the future's
//! [`ResultCell`].
//!
//! A second delivery is a fault. It is logged at `error` level and then
//! handled according to [`DuplicateCompletionResponse`]; in no case is the
//! stored outcome replaced.

use super::cell::ResultCell;
use crate::config::DuplicateCompletionResponse;
use crate::error::{Error, ErrorKind, Result};
use crate::naming::{FullAddress, LocalityId};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Type-erased write side of a result cell.
pub trait CompletionSink: Send + Sync {
    /// Stores a boxed value.
    ///
    /// A value of the wrong type stores a [`ErrorKind::ResultTypeMismatch`]
    /// failure instead, so the reader is never left waiting.
    fn set_value(&self, value: Box<dyn Any + Send>) -> Result<()>;

    /// Stores an error.
    fn set_error(&self, error: Error) -> Result<()>;

    /// Returns true once an outcome is stored.
    fn is_complete(&self) -> bool;
}

impl<T: Send + Sync + 'static> CompletionSink for ResultCell<T> {
    fn set_value(&self, value: Box<dyn Any + Send>) -> Result<()> {
        match value.downcast::<T>() {
            Ok(value) => self.write_value(*value),
            Err(_) => {
                let mismatch = Error::new(ErrorKind::ResultTypeMismatch)
                    .with_message(format!("expected a value of type {}", type_name::<T>()));
                self.write_error(mismatch.clone())?;
                Err(mismatch)
            }
        }
    }

    fn set_error(&self, error: Error) -> Result<()> {
        self.write_error(error)
    }

    fn is_complete(&self) -> bool {
        self.is_ready()
    }
}

/// Delivery route for the outcome of one invocation.
///
/// The route is the sink: it is the write side of the waiting future's
/// result cell, and every delivery goes there. The origin locality and the
/// target's full address only correlate the completion with the invocation
/// in logs and duplicate reports. Two continuations for the same target stay
/// independent.
#[derive(Clone)]
pub struct Continuation {
    origin: LocalityId,
    target: FullAddress,
    sink: Arc<dyn CompletionSink>,
    on_duplicate: DuplicateCompletionResponse,
}

impl Continuation {
    /// Creates a continuation for an invocation of `target` issued from `origin`.
    #[must_use]
    pub fn new(
        origin: LocalityId,
        target: FullAddress,
        sink: Arc<dyn CompletionSink>,
        on_duplicate: DuplicateCompletionResponse,
    ) -> Self {
        Self {
            origin,
            target,
            sink,
            on_duplicate,
        }
    }

    /// Returns the locality that issued the invocation.
    #[must_use]
    pub const fn origin(&self) -> LocalityId {
        self.origin
    }

    /// Returns the resolved address of the invocation target.
    ///
    /// Used for correlation only; deliveries never consult it.
    #[must_use]
    pub const fn target(&self) -> &FullAddress {
        &self.target
    }

    /// Returns true once the future has an outcome.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sink.is_complete()
    }

    /// Delivers a successful result.
    pub fn deliver_value<T: Send + 'static>(&self, value: T) -> Result<()> {
        self.deliver_boxed(Box::new(value))
    }

    /// Delivers a successful, already boxed result.
    pub fn deliver_boxed(&self, value: Box<dyn Any + Send>) -> Result<()> {
        let res = self.sink.set_value(value);
        self.settle(res)
    }

    /// Delivers a failure.
    pub fn deliver_error(&self, error: Error) -> Result<()> {
        tracing::debug!(target_id = %self.target.id(), error = %error, "delivering failure");
        let res = self.sink.set_error(error);
        self.settle(res)
    }

    /// Delivers either outcome.
    pub fn deliver(&self, outcome: Result<Box<dyn Any + Send>>) -> Result<()> {
        match outcome {
            Ok(value) => self.deliver_boxed(value),
            Err(error) => self.deliver_error(error),
        }
    }

    fn settle(&self, res: Result<()>) -> Result<()> {
        let Err(err) = res else { return Ok(()) };
        if !err.is_duplicate_completion() {
            return Err(err);
        }
        tracing::error!(
            origin = %self.origin,
            target_addr = %self.target,
            policy = %self.on_duplicate,
            error = %err,
            "duplicate completion"
        );
        match self.on_duplicate {
            DuplicateCompletionResponse::Panic => {
                panic!("duplicate completion for {}: {err}", self.target)
            }
            DuplicateCompletionResponse::Log => Err(err),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("origin", &self.origin)
            .field("target", &self.target)
            .field("complete", &self.is_complete())
            .field("on_duplicate", &self.on_duplicate)
            .finish()
    }
}
