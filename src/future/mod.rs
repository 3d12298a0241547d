//! Eager futures and the completion path that fills them.
//!
//! - [`ResultCell`]: single-assignment storage for one outcome
//! - [`Continuation`]: the completion handle carried by a dispatched invocation
//! - [`EagerFuture`]: binds an action to a cell and issues it on `apply`

mod cell;
mod continuation;
mod eager;

pub use cell::{CellState, Ready, ResultCell};
pub use continuation::{CompletionSink, Continuation};
pub use eager::{Deferred, Direct, DirectEagerFuture, EagerFuture, Strategy};
