//! Error types and error handling strategy for farcall.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Resolution failures are surfaced synchronously by `apply`
//! - Execution failures travel through the completion path and are stored
//!   in the result cell, surfacing when the caller reads the future
//! - Panics inside actions are isolated and converted to [`ErrorKind::ActionPanicked`]
//!
//! # Error Categories
//!
//! - **Naming**: identity could not be resolved, or resolved to the wrong kind of target
//! - **Invocation**: the action itself failed (locally or on a remote peer)
//! - **Transport**: the invocation could not be handed to a remote peer
//! - **Completion**: single-write violations on a result cell
//! - **Lifecycle**: misuse of a future (double apply, read before apply)
//! - **Internal**: runtime bugs and invalid states

use core::fmt;
use std::sync::Arc;

use crate::naming::GlobalId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Naming ===
    /// The target identity could not be resolved to an address.
    UnresolvedTarget,
    /// The resolved target does not provide the capability the action requires.
    IncompatibleTarget,

    // === Invocation ===
    /// The action body returned an error.
    ActionFailed,
    /// The action body panicked.
    ActionPanicked,
    /// A remote peer reported a failure instead of a value.
    RemoteFailure,
    /// A completion delivered a value of a type the future does not hold.
    ResultTypeMismatch,

    // === Transport ===
    /// The transport refused or lost the invocation.
    TransportFailed,

    // === Completion ===
    /// A result cell was written more than once.
    DuplicateCompletion,

    // === Lifecycle ===
    /// `apply` was called on a future that has already been applied.
    AlreadyApplied,
    /// The future was read before a successful `apply`.
    NotApplied,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnresolvedTarget | Self::IncompatibleTarget => ErrorCategory::Naming,
            Self::ActionFailed
            | Self::ActionPanicked
            | Self::RemoteFailure
            | Self::ResultTypeMismatch => ErrorCategory::Invocation,
            Self::TransportFailed => ErrorCategory::Transport,
            Self::DuplicateCompletion => ErrorCategory::Completion,
            Self::AlreadyApplied | Self::NotApplied => ErrorCategory::Lifecycle,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            // A migrating target may resolve on the next attempt.
            Self::UnresolvedTarget | Self::TransportFailed => Recoverability::Transient,

            Self::IncompatibleTarget
            | Self::ResultTypeMismatch
            | Self::DuplicateCompletion
            | Self::AlreadyApplied
            | Self::NotApplied
            | Self::Internal => Recoverability::Permanent,

            Self::ActionFailed | Self::ActionPanicked | Self::RemoteFailure => {
                Recoverability::Unknown
            }
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }

    /// Returns true if this kind indicates a broken internal invariant
    /// rather than an ordinary failure.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleTarget | Self::DuplicateCompletion | Self::Internal
        )
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity resolution and target capability failures.
    Naming,
    /// Failures reported by the invoked action.
    Invocation,
    /// Transport-layer failures.
    Transport,
    /// Single-write violations.
    Completion,
    /// Future lifecycle misuse.
    Lifecycle,
    /// Internal runtime errors.
    Internal,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The action being invoked when the error occurred.
    pub action: Option<&'static str>,
    /// The target identity of the invocation.
    pub target: Option<GlobalId>,
}

/// The main error type for farcall operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                action: None,
                target: None,
            },
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Records the action name in the error context.
    #[must_use]
    pub fn with_action(mut self, action: &'static str) -> Self {
        self.context.action = Some(action);
        self
    }

    /// Records the target identity in the error context.
    #[must_use]
    pub fn with_target(mut self, target: GlobalId) -> Self {
        self.context.target = Some(target);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Returns true if this error was reported by the invoked action
    /// (locally or remotely) rather than by the invocation machinery.
    #[must_use]
    pub const fn is_action_error(&self) -> bool {
        matches!(self.kind.category(), ErrorCategory::Invocation)
    }

    /// Returns true if this is a duplicate-completion fault.
    #[must_use]
    pub const fn is_duplicate_completion(&self) -> bool {
        matches!(self.kind, ErrorKind::DuplicateCompletion)
    }

    /// Creates an unresolved target error.
    #[must_use]
    pub fn unresolved_target(target: GlobalId) -> Self {
        Self::new(ErrorKind::UnresolvedTarget)
            .with_message(format!("couldn't retrieve full address for {target}"))
            .with_target(target)
    }

    /// Creates an action failure with a description.
    #[must_use]
    pub fn action_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ActionFailed).with_message(reason)
    }

    /// Creates a remote failure carrying the description reported by the peer.
    #[must_use]
    pub fn remote_failure(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteFailure).with_message(description)
    }

    /// Creates a transport failure.
    #[must_use]
    pub fn transport_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportFailed).with_message(detail)
    }

    /// Creates a duplicate completion fault.
    #[must_use]
    pub fn duplicate_completion(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateCompletion).with_message(detail)
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Converts a caught panic payload into an [`ErrorKind::ActionPanicked`] error.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(ErrorKind::ActionPanicked).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for farcall operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
