//! Farcall: eager futures for location-transparent remote action invocation.
//!
//! # Overview
//!
//! A caller names a unit of work (an [`Action`]) and a target by its
//! [`GlobalId`], issues the invocation with [`EagerFuture::apply`] and later
//! reads the outcome with [`EagerFuture::get`]. Issuing never waits for the
//! work; only the read blocks.
//!
//! # Core Guarantees
//!
//! - **Location transparency**: the same call works whether the target lives
//!   in this locality or on a peer
//! - **Exactly-once completion**: a result cell accepts one write; every later
//!   attempt is detected as [`ErrorKind::DuplicateCompletion`]
//! - **Fast local path**: the [`Direct`] strategy runs co-located targets
//!   inline, with no worker, continuation or queue involved
//! - **Equivalent strategies**: [`Direct`] and [`Deferred`] store the same
//!   outcome for the same action, arguments and target
//! - **No silent failures**: resolution failures are returned by `apply`;
//!   execution failures are stored and surface from `get`
//! - **Explicit collaborators**: resolution, dispatch, metrics and
//!   configuration all flow through a [`Cx`]
//!
//! # Module Structure
//!
//! - [`action`]: Action descriptors and argument arity
//! - [`component`]: Component-type tags and the compatibility check
//! - [`config`]: Runtime configuration and environment overrides
//! - [`cx`]: Invocation context
//! - [`dispatch`]: Dispatcher seam, worker pool, locality router, transport
//! - [`error`]: Error types
//! - [`future`]: Result cells, continuations and eager futures
//! - [`naming`]: Global identities, addresses and the resolver seam
//! - [`observability`]: Invocation counters and apply-latency histograms
//!
//! # Example
//!
//! ```ignore
//! use farcall::{DirectEagerFuture, EagerFuture};
//!
//! let calc = table.bind_local(Calculator);
//!
//! let deferred = EagerFuture::<Add>::with_apply(&cx, &calc, (2, 3))?;
//! let direct = DirectEagerFuture::<Add>::with_apply(&cx, &calc, (2, 3))?;
//! assert_eq!(deferred.get()?, direct.get()?);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod action;
pub mod component;
pub mod config;
pub mod cx;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod naming;
pub mod observability;

// Re-exports for convenient access to core types
pub use action::{Action, Arguments};
pub use component::{AnyComponent, Component, ComponentType};
pub use config::{Config, ConfigError, DuplicateCompletionResponse};
pub use cx::Cx;
pub use dispatch::{
    Dispatcher, Invocation, LocalityRouter, QueueTransport, SendError, Transport, WorkerPool,
};
pub use error::{
    Error, ErrorCategory, ErrorContext, ErrorKind, Recoverability, Result, ResultExt,
};
pub use future::{
    CellState, CompletionSink, Continuation, Deferred, Direct, DirectEagerFuture, EagerFuture,
    ResultCell, Strategy,
};
pub use naming::{
    Address, AddressTable, FullAddress, GlobalId, LocalHandle, LocalityId, Resolution, Resolver,
};
pub use observability::{InvocationMetrics, Metrics, MetricsSnapshot, NoOpMetrics};
