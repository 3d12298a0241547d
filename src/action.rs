//! Action descriptors.
//!
//! An [`Action`] is the static description of one kind of remote work: the
//! component type it runs against, the shape of its arguments, its result
//! type, and the body executed in the owning locality. Descriptors carry no
//! state and are shared freely across concurrent invocations.
//!
//! Arguments are a tuple of up to eight positional slots. Argument order is
//! the tuple order, and the same tuple flows unchanged through every
//! strategy and dispatcher.
//!
//! # Example
//!
//! ```
//! use farcall::{Action, Component, ComponentType, Result};
//!
//! struct Calculator;
//!
//! impl Component for Calculator {
//!     const COMPONENT_TYPE: ComponentType = ComponentType::new(1);
//! }
//!
//! struct Add;
//!
//! impl Action for Add {
//!     type Component = Calculator;
//!     type Args = (i64, i64);
//!     type Output = i64;
//!     const NAME: &'static str = "calculator::add";
//!
//!     fn execute(_: &Calculator, (a, b): (i64, i64)) -> Result<i64> {
//!         Ok(a + b)
//!     }
//! }
//! ```

use crate::component::{Component, ComponentType};
use crate::error::Result;

/// A positional argument list.
///
/// Implemented for tuples of 0 through 8 elements.
pub trait Arguments: Send + 'static {
    /// Number of argument slots.
    const ARITY: usize;
}

macro_rules! impl_arguments {
    ($arity:expr; $($name:ident),*) => {
        impl<$($name: Send + 'static),*> Arguments for ($($name,)*) {
            const ARITY: usize = $arity;
        }
    };
}

impl_arguments!(0;);
impl_arguments!(1; A0);
impl_arguments!(2; A0, A1);
impl_arguments!(3; A0, A1, A2);
impl_arguments!(4; A0, A1, A2, A3);
impl_arguments!(5; A0, A1, A2, A3, A4);
impl_arguments!(6; A0, A1, A2, A3, A4, A5);
impl_arguments!(7; A0, A1, A2, A3, A4, A5, A6);
impl_arguments!(8; A0, A1, A2, A3, A4, A5, A6, A7);

/// Static description of an invocable unit of work.
pub trait Action: Send + Sync + 'static {
    /// Component the action runs against.
    type Component: Component;
    /// Positional arguments.
    type Args: Arguments;
    /// Result type stored in the future.
    ///
    /// Shared between the future and its single writer, hence `Sync`.
    type Output: Send + Sync + 'static;

    /// Stable name used for diagnostics and routing.
    const NAME: &'static str;

    /// Runs the action body against a live local component.
    fn execute(component: &Self::Component, args: Self::Args) -> Result<Self::Output>;

    /// Component type a target must be compatible with.
    #[must_use]
    fn required_type() -> ComponentType {
        <Self::Component as Component>::COMPONENT_TYPE
    }

    /// Number of argument slots.
    #[must_use]
    fn arity() -> usize {
        <Self::Args as Arguments>::ARITY
    }
}
