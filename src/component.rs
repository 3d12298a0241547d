//! Component types and the compatibility check used before dispatch.
//!
//! Every addressable resource has a [`ComponentType`]. The low 16 bits hold
//! the base type; the high 16 bits hold a derived discriminator, zero for
//! a plain base type. An action written against a base type accepts any
//! component derived from it, but an action written against a derived type
//! only accepts that exact type.
//!
//! A derived component reaches its base through [`Component::base`], so an
//! action bound to the base type finds the base instance inside any derived
//! target. [`serves`] walks that chain.

use std::any::Any;
use std::fmt;

/// Runtime component type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType(u32);

impl ComponentType {
    /// Creates a base component type.
    #[must_use]
    pub const fn new(base: u16) -> Self {
        Self(base as u32)
    }

    /// Creates a component type derived from `base`.
    ///
    /// A `derived` value of zero yields the base type itself.
    #[must_use]
    pub const fn derived(base: u16, derived: u16) -> Self {
        Self(((derived as u32) << 16) | base as u32)
    }

    /// Returns the base type.
    #[must_use]
    pub const fn base(self) -> Self {
        Self(self.0 & 0xffff)
    }

    /// Returns true if this type is derived from a base type.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        self.0 >> 16 != 0
    }

    /// Returns the raw tag.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns true if a target of this type can serve an action that
    /// requires `required`.
    #[must_use]
    pub const fn is_compatible_with(self, required: Self) -> bool {
        if self.0 == required.0 {
            return true;
        }
        !required.is_derived() && self.base().0 == required.0
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({self})")
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_derived() {
            write!(f, "{}/{}", self.0 & 0xffff, self.0 >> 16)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A resource that actions can be invoked on.
///
/// Implementors are shared across worker threads, so any mutable state
/// must sit behind interior synchronization.
pub trait Component: Any + Send + Sync {
    /// The runtime type tag of this component.
    const COMPONENT_TYPE: ComponentType;

    /// The base component this one extends.
    ///
    /// Components with a derived [`ComponentType`] must return the instance
    /// whose type is their base type; binding one that does not is rejected.
    fn base(&self) -> Option<&dyn AnyComponent> {
        None
    }
}

/// Object-safe view of a [`Component`].
pub trait AnyComponent: Any + Send + Sync {
    /// The runtime type tag of the instance.
    fn component_type(&self) -> ComponentType;

    /// The instance as [`Any`], for downcasting to its concrete type.
    fn as_any(&self) -> &dyn Any;

    /// The base component, if this one is derived.
    fn base_component(&self) -> Option<&dyn AnyComponent>;
}

impl<C: Component> AnyComponent for C {
    fn component_type(&self) -> ComponentType {
        C::COMPONENT_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn base_component(&self) -> Option<&dyn AnyComponent> {
        self.base()
    }
}

/// Borrows `component`, or the first base along its chain, as a `C`.
#[must_use]
pub fn serves<C: Component>(component: &dyn AnyComponent) -> Option<&C> {
    let mut current = Some(component);
    while let Some(candidate) = current {
        if let Some(found) = candidate.as_any().downcast_ref::<C>() {
            return Some(found);
        }
        current = candidate.base_component();
    }
    None
}

/// Returns true if a derived component exposes an instance of its base type.
///
/// Base components trivially pass.
#[must_use]
pub fn exposes_base(component: &dyn AnyComponent) -> bool {
    let ty = component.component_type();
    if !ty.is_derived() {
        return true;
    }
    let mut current = component.base_component();
    while let Some(candidate) = current {
        if candidate.component_type() == ty.base() {
            return true;
        }
        current = candidate.base_component();
    }
    false
}
