//! Eager futures: issue an action now, read its result later.
//!
//! An [`EagerFuture`] binds an [`Action`] to a result cell. [`apply`] issues
//! the invocation against a target identity and returns without waiting for
//! the work; [`get`] blocks until the outcome arrives. The invocation
//! strategy is a type parameter:
//!
//! - [`Deferred`] always hands the invocation to the dispatcher, with a
//!   continuation that completes this future.
//! - [`Direct`] checks locality first. A local target runs inline on the
//!   calling thread and writes the cell directly, with no worker, no
//!   continuation and no queue. A remote target falls back to dispatch.
//!
//! Both strategies store the same outcome for the same action, arguments
//! and target; only the execution path differs.
//!
//! # Lifecycle
//!
//! A future is applied at most once. A second [`apply`] fails with
//! [`ErrorKind::AlreadyApplied`] without dispatching anything. An `apply`
//! that fails to resolve its target leaves the future unapplied, so it can
//! be applied again. Reading a future that was never applied fails with
//! [`ErrorKind::NotApplied`] instead of blocking forever.
//!
//! The cell is reference-counted and shared with the pending writer, so
//! dropping the future while an invocation is in flight is allowed; the
//! late completion lands in a cell nobody reads.
//!
//! # Example
//!
//! ```ignore
//! let fut = EagerFuture::<Add, Direct>::new(&cx);
//! fut.apply(&calculator, (2, 3))?;
//! assert_eq!(fut.get()?, 5);
//! ```
//!
//! [`apply`]: EagerFuture::apply
//! [`get`]: EagerFuture::get

use super::cell::{CellState, ResultCell};
use super::continuation::{CompletionSink, Continuation};
use crate::action::Action;
use crate::cx::Cx;
use crate::dispatch::Invocation;
use crate::error::{Error, ErrorKind, Result};
use crate::naming::{Address, GlobalId, Resolution};
use crate::observability::ApplyTimer;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const IDLE: u8 = 0;
const APPLYING: u8 = 1;
const APPLIED: u8 = 2;

mod sealed {
    pub trait Sealed {}
}

/// How an eager future issues its invocation.
///
/// Sealed: the strategies are [`Deferred`] and [`Direct`].
pub trait Strategy: sealed::Sealed + Send + Sync + 'static {
    /// Label used for profiling and logs.
    const LABEL: &'static str;

    /// Issues one invocation whose outcome is written into `cell`.
    #[doc(hidden)]
    fn issue<A: Action>(
        cx: &Cx,
        target: &GlobalId,
        args: A::Args,
        cell: &Arc<ResultCell<A::Output>>,
    ) -> Result<()>;
}

/// Strategy that always goes through the dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deferred;

/// Strategy that executes local targets inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl sealed::Sealed for Deferred {}
impl sealed::Sealed for Direct {}

impl Strategy for Deferred {
    const LABEL: &'static str = "eager_future::apply";

    fn issue<A: Action>(
        cx: &Cx,
        target: &GlobalId,
        args: A::Args,
        cell: &Arc<ResultCell<A::Output>>,
    ) -> Result<()> {
        cx.metrics().invocation_recorded(A::NAME);
        let continuation = continuation_for::<A>(cx, target, cell)?;
        cx.dispatcher()
            .dispatch(Invocation::new::<A>(*target, None, continuation, args));
        Ok(())
    }
}

impl Strategy for Direct {
    const LABEL: &'static str = "eager_future_direct::apply";

    fn issue<A: Action>(
        cx: &Cx,
        target: &GlobalId,
        args: A::Args,
        cell: &Arc<ResultCell<A::Output>>,
    ) -> Result<()> {
        cx.metrics().invocation_recorded(A::NAME);
        let resolution = cx
            .resolver()
            .resolve_locality(target)
            .map_err(|err| unresolved::<A>(err, target))?;
        match resolution {
            Resolution::Local(address) => execute_inline::<A>(&address, target, args, cell),
            Resolution::Remote(address) => {
                let continuation = continuation_for::<A>(cx, target, cell)?;
                cx.dispatcher().dispatch(Invocation::new::<A>(
                    *target,
                    Some(address),
                    continuation,
                    args,
                ));
                Ok(())
            }
        }
    }
}

fn unresolved<A: Action>(err: Error, target: &GlobalId) -> Error {
    let err = if err.kind() == ErrorKind::UnresolvedTarget {
        err
    } else {
        Error::unresolved_target(*target).with_source(err)
    };
    err.with_action(A::NAME)
}

fn continuation_for<A: Action>(
    cx: &Cx,
    target: &GlobalId,
    cell: &Arc<ResultCell<A::Output>>,
) -> Result<Continuation> {
    let address = cx
        .resolver()
        .resolve_full_address(target)
        .map_err(|err| unresolved::<A>(err, target))?;
    let sink: Arc<dyn CompletionSink> = cell.clone();
    Ok(Continuation::new(
        cx.here(),
        address,
        sink,
        cx.config().duplicate_completion,
    ))
}

fn execute_inline<A: Action>(
    address: &Address,
    target: &GlobalId,
    args: A::Args,
    cell: &ResultCell<A::Output>,
) -> Result<()> {
    if !address.component_type().is_compatible_with(A::required_type()) {
        tracing::error!(
            action = A::NAME,
            id = %target,
            required = %A::required_type(),
            found = %address.component_type(),
            "incompatible target on the local fast path"
        );
        panic!(
            "{} requires component type {}, but {target} is {}",
            A::NAME,
            A::required_type(),
            address.component_type()
        );
    }
    let Some(component) = address.handle().downcast::<A::Component>() else {
        tracing::error!(action = A::NAME, id = %target, "local handle does not pin the component");
        panic!(
            "{} expects a live {} behind {target}",
            A::NAME,
            type_name::<A::Component>()
        );
    };

    tracing::trace!(action = A::NAME, id = %target, "executing on the local fast path");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| A::execute(component, args)))
        .unwrap_or_else(|payload| Err(Error::from_panic(payload.as_ref())));
    match outcome {
        Ok(value) => cell.write_value(value),
        Err(err) => cell.write_error(err.with_action(A::NAME).with_target(*target)),
    }
}

/// A future whose invocation is issued by an explicit [`apply`](Self::apply).
pub struct EagerFuture<A: Action, S: Strategy = Deferred> {
    cx: Cx,
    cell: Arc<ResultCell<A::Output>>,
    applied: AtomicU8,
    _marker: PhantomData<fn() -> (A, S)>,
}

/// Eager future using the [`Direct`] strategy.
pub type DirectEagerFuture<A> = EagerFuture<A, Direct>;

impl<A: Action, S: Strategy> EagerFuture<A, S> {
    /// Creates an unapplied future.
    #[must_use]
    pub fn new(cx: &Cx) -> Self {
        Self {
            cx: cx.clone(),
            cell: Arc::new(ResultCell::new()),
            applied: AtomicU8::new(IDLE),
            _marker: PhantomData,
        }
    }

    /// Creates a future and applies it immediately.
    pub fn with_apply(cx: &Cx, target: &GlobalId, args: A::Args) -> Result<Self> {
        let future = Self::new(cx);
        future.apply(target, args)?;
        Ok(future)
    }

    /// Issues the invocation of `A` on `target`.
    ///
    /// Returns once the invocation is issued (for [`Direct`] on a local
    /// target, once it has run). Resolution failures are returned here as
    /// [`ErrorKind::UnresolvedTarget`]; failures of the action itself are
    /// stored and surface from [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// With [`Direct`], panics if a local target is not compatible with the
    /// action's component type. That indicates misrouting, not a runtime
    /// condition.
    pub fn apply(&self, target: &GlobalId, args: A::Args) -> Result<()> {
        if self
            .applied
            .compare_exchange(IDLE, APPLYING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::new(ErrorKind::AlreadyApplied)
                .with_message("eager future can only be applied once")
                .with_action(A::NAME)
                .with_target(*target));
        }

        let _timer = ApplyTimer::start_if(
            self.cx.config().profile_apply,
            self.cx.metrics(),
            S::LABEL,
        );
        tracing::debug!(
            action = A::NAME,
            id = %target,
            strategy = S::LABEL,
            arity = A::arity(),
            "apply"
        );

        match S::issue::<A>(&self.cx, target, args, &self.cell) {
            Ok(()) => {
                self.applied.store(APPLIED, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                self.applied.store(IDLE, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Returns true once [`apply`](Self::apply) has succeeded.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire) == APPLIED
    }

    /// Returns true once an outcome is stored.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }

    /// Returns the state of the result cell.
    #[must_use]
    pub fn state(&self) -> CellState {
        self.cell.state()
    }

    /// Blocks until the outcome is stored and borrows the value.
    pub fn wait(&self) -> Result<&A::Output> {
        self.ensure_applied()?;
        self.cell.wait().as_ref().map_err(Clone::clone)
    }

    fn ensure_applied(&self) -> Result<()> {
        if self.applied.load(Ordering::Acquire) != APPLIED {
            return Err(Error::new(ErrorKind::NotApplied)
                .with_message("eager future read before apply completed")
                .with_action(A::NAME));
        }
        Ok(())
    }
}

impl<A, S> EagerFuture<A, S>
where
    A: Action,
    A::Output: Clone,
    S: Strategy,
{
    /// Blocks until the outcome is stored and returns it.
    ///
    /// Repeatable: every call returns the same outcome.
    pub fn get(&self) -> Result<A::Output> {
        self.ensure_applied()?;
        self.cell.read()
    }

    /// Blocks for at most `timeout`; `None` if no outcome arrived in time.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<A::Output>> {
        if let Err(err) = self.ensure_applied() {
            return Some(Err(err));
        }
        self.cell.read_timeout(timeout)
    }

    /// Returns the outcome if one is stored, without blocking.
    pub fn try_get(&self) -> Option<Result<A::Output>> {
        if let Err(err) = self.ensure_applied() {
            return Some(Err(err));
        }
        self.cell.try_read()
    }

    /// Waits asynchronously for the outcome.
    pub async fn ready(&self) -> Result<A::Output> {
        self.ensure_applied()?;
        self.cell.ready().await.clone()
    }
}

impl<A: Action, S: Strategy> fmt::Debug for EagerFuture<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerFuture")
            .field("action", &A::NAME)
            .field("strategy", &S::LABEL)
            .field("applied", &self.is_applied())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
