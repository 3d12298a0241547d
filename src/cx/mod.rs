//! Invocation context.
//!
//! The [`Cx`] type carries the collaborators an invocation needs: the
//! resolver, the dispatcher, the metrics hook and the configuration. There
//! is no ambient runtime; every eager future is built from an explicit `Cx`.

pub mod cx;

pub use cx::Cx;
