//! Dispatch of type-erased invocations.
//!
//! A [`Dispatcher`] accepts an [`Invocation`] (action, target, arguments and
//! continuation) and takes responsibility for it: the invocation ends in
//! exactly one delivery into its continuation, either the action's outcome
//! or the reason it could not be run. Dispatch is fire-and-forget; nothing
//! is returned to the caller.
//!
//! [`LocalityRouter`] is the default dispatcher. It runs local targets on a
//! [`WorkerPool`] and hands remote targets to a [`Transport`].

mod pool;
mod router;
mod transport;

pub use pool::WorkerPool;
pub use router::LocalityRouter;
pub use transport::{QueueTransport, SendError, Transport};

use crate::action::Action;
use crate::component::ComponentType;
use crate::error::{Error, ErrorKind, Result};
use crate::future::Continuation;
use crate::naming::{Address, GlobalId, LocalHandle};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Accepts invocations for execution.
pub trait Dispatcher: Send + Sync + 'static {
    /// Takes ownership of `invocation`.
    ///
    /// Implementations must eventually deliver exactly one outcome into the
    /// invocation's continuation, unless the process terminates first.
    fn dispatch(&self, invocation: Invocation);
}

type Thunk = fn(&LocalHandle, Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>>;

/// One invocation of an action, with its types erased.
///
/// Built by the eager future from an [`Action`] and executed against a local
/// handle by whichever locality owns the target.
pub struct Invocation {
    action: &'static str,
    arity: usize,
    required: ComponentType,
    target: GlobalId,
    address: Option<Address>,
    continuation: Continuation,
    args: Box<dyn Any + Send>,
    thunk: Thunk,
}

impl Invocation {
    /// Packages an invocation of `A` on `target`.
    ///
    /// `address` is an already-resolved address the dispatcher may use
    /// instead of resolving `target` again.
    #[must_use]
    pub fn new<A: Action>(
        target: GlobalId,
        address: Option<Address>,
        continuation: Continuation,
        args: A::Args,
    ) -> Self {
        Self {
            action: A::NAME,
            arity: A::arity(),
            required: A::required_type(),
            target,
            address,
            continuation,
            args: Box::new(args),
            thunk: run_erased::<A>,
        }
    }

    /// Returns the action name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        self.action
    }

    /// Returns the number of argument slots.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the component type the action requires.
    #[must_use]
    pub const fn required_type(&self) -> ComponentType {
        self.required
    }

    /// Returns the target identity.
    #[must_use]
    pub const fn target(&self) -> GlobalId {
        self.target
    }

    /// Returns the pre-resolved address, if one was supplied.
    #[must_use]
    pub const fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Removes and returns the pre-resolved address.
    pub fn take_address(&mut self) -> Option<Address> {
        self.address.take()
    }

    /// Returns the continuation the outcome is delivered to.
    #[must_use]
    pub const fn continuation(&self) -> &Continuation {
        &self.continuation
    }

    /// Runs the action against `handle` and delivers the outcome.
    ///
    /// A panic in the action body is caught and delivered as
    /// [`ErrorKind::ActionPanicked`]. The returned error, if any, is the
    /// delivery error (for example a duplicate completion under the `Log`
    /// policy), never the action's own failure.
    pub fn execute(self, handle: &LocalHandle) -> Result<()> {
        let Self {
            action,
            target,
            continuation,
            args,
            thunk,
            ..
        } = self;
        tracing::trace!(action, id = %target, "executing invocation");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| thunk(handle, args)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload.as_ref())))
            .map_err(|err| err.with_action(action).with_target(target));
        continuation.deliver(outcome)
    }

    /// Abandons the invocation, delivering `error` as its outcome.
    pub fn fail(self, error: Error) -> Result<()> {
        let error = error.with_action(self.action).with_target(self.target);
        self.continuation.deliver_error(error)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("action", &self.action)
            .field("arity", &self.arity)
            .field("target", &self.target)
            .field("address", &self.address)
            .field("continuation", &self.continuation)
            .finish_non_exhaustive()
    }
}

fn run_erased<A: Action>(
    handle: &LocalHandle,
    args: Box<dyn Any + Send>,
) -> Result<Box<dyn Any + Send>> {
    let component = handle.downcast::<A::Component>().ok_or_else(|| {
        Error::new(ErrorKind::IncompatibleTarget).with_message(format!(
            "target is not a component of type {}",
            A::required_type()
        ))
    })?;
    let args = args
        .downcast::<A::Args>()
        .map_err(|_| Error::internal("argument payload does not match the action"))?;
    let output = A::execute(component, *args)?;
    Ok(Box::new(output))
}
