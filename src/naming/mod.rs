//! Global identities, resolved addresses and the resolver seam.
//!
//! A [`GlobalId`] names a distributed resource without saying where it
//! lives. A [`Resolver`] turns it into an [`Address`] (locality, local
//! handle, component type) or a [`FullAddress`] (address plus identity,
//! the form attached to continuations).
//!
//! Addresses are snapshots: a resource may migrate after resolution, so
//! callers use an address for a single invocation and never cache it.

mod table;

pub use table::AddressTable;

use crate::component::{AnyComponent, Component, ComponentType};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Opaque, location-transparent identity of a distributed resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalId {
    msb: u64,
    lsb: u64,
}

impl GlobalId {
    /// The invalid (never bound) identity.
    pub const INVALID: Self = Self { msb: 0, lsb: 0 };

    /// Creates an identity from its two halves.
    #[must_use]
    pub const fn new(msb: u64, lsb: u64) -> Self {
        Self { msb, lsb }
    }

    /// Creates an identity from a raw 128-bit value.
    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self {
            msb: (raw >> 64) as u64,
            lsb: raw as u64,
        }
    }

    /// Returns the raw 128-bit value.
    #[must_use]
    pub const fn raw(self) -> u128 {
        ((self.msb as u128) << 64) | self.lsb as u128
    }

    /// Returns the most significant half.
    #[must_use]
    pub const fn msb(self) -> u64 {
        self.msb
    }

    /// Returns the least significant half.
    #[must_use]
    pub const fn lsb(self) -> u64 {
        self.lsb
    }

    /// Returns true unless this is [`GlobalId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.msb != 0 || self.lsb != 0
    }
}

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalId({self})")
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:016x}, {:016x}}}", self.msb, self.lsb)
    }
}

/// Identifier of a locality (one address space participating in the system).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalityId(u32);

impl LocalityId {
    /// Creates a locality identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Handle to a resource inside its owning locality.
///
/// The raw value is meaningful only to the owning locality. When the owner
/// is the resolving locality, the handle also pins the live instance so the
/// resource can be reached without another lookup.
#[derive(Clone)]
pub struct LocalHandle {
    raw: u64,
    instance: Option<Arc<dyn AnyComponent>>,
}

impl LocalHandle {
    /// Creates a handle for a resource owned by another locality.
    #[must_use]
    pub const fn remote(raw: u64) -> Self {
        Self {
            raw,
            instance: None,
        }
    }

    /// Creates a handle pinning a live local instance.
    #[must_use]
    pub fn pinned<C: Component>(raw: u64, instance: Arc<C>) -> Self {
        Self {
            raw,
            instance: Some(instance),
        }
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Returns true if this handle pins a live local instance.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.instance.is_some()
    }

    /// Borrows the pinned instance as `C`.
    ///
    /// A derived instance is also viewed as any base along its chain.
    /// Returns `None` if nothing is pinned or no instance in the chain is a `C`.
    #[must_use]
    pub fn downcast<C: Component>(&self) -> Option<&C> {
        crate::component::serves::<C>(self.instance.as_deref()?)
    }
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandle")
            .field("raw", &format_args!("{:#x}", self.raw))
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

/// A resolved address: where a resource lives and what kind it is.
#[derive(Clone, Debug)]
pub struct Address {
    locality: LocalityId,
    handle: LocalHandle,
    component_type: ComponentType,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub const fn new(
        locality: LocalityId,
        handle: LocalHandle,
        component_type: ComponentType,
    ) -> Self {
        Self {
            locality,
            handle,
            component_type,
        }
    }

    /// Returns the owning locality.
    #[must_use]
    pub const fn locality(&self) -> LocalityId {
        self.locality
    }

    /// Returns the handle inside the owning locality.
    #[must_use]
    pub const fn handle(&self) -> &LocalHandle {
        &self.handle
    }

    /// Returns the component type of the resource.
    #[must_use]
    pub const fn component_type(&self) -> ComponentType {
        self.component_type
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:#x}({})",
            self.locality,
            self.handle.raw(),
            self.component_type
        )
    }
}

/// An address together with the identity it was resolved from.
///
/// This is the form carried by continuations, so a reply produced in
/// another locality can be correlated with its invocation.
#[derive(Clone, Debug)]
pub struct FullAddress {
    address: Address,
    id: GlobalId,
}

impl FullAddress {
    /// Creates a full address.
    #[must_use]
    pub const fn new(address: Address, id: GlobalId) -> Self {
        Self { address, id }
    }

    /// Returns the resolved address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the identity.
    #[must_use]
    pub const fn id(&self) -> GlobalId {
        self.id
    }

    /// Returns the owning locality.
    #[must_use]
    pub const fn locality(&self) -> LocalityId {
        self.address.locality
    }
}

impl fmt::Display for FullAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Result of a locality check.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// The resource lives in the resolving locality; the handle is pinned.
    Local(Address),
    /// The resource lives in another locality.
    Remote(Address),
}

impl Resolution {
    /// Returns true for [`Resolution::Local`].
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the resolved address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        match self {
            Self::Local(addr) | Self::Remote(addr) => addr,
        }
    }

    /// Consumes the resolution, returning the address.
    #[must_use]
    pub fn into_address(self) -> Address {
        match self {
            Self::Local(addr) | Self::Remote(addr) => addr,
        }
    }
}

/// Naming service seam: maps global identities to addresses.
///
/// Implementations are process-wide and are called without any lock held
/// by the caller. Calls may be slow but must not block on the completion
/// of invocations. Failures are not retried by the caller.
pub trait Resolver: Send + Sync + 'static {
    /// Returns the locality this resolver answers for.
    fn here(&self) -> LocalityId;

    /// Determines whether `id` is local and returns its address.
    fn resolve_locality(&self, id: &GlobalId) -> Result<Resolution>;

    /// Resolves `id` to the full address form used by continuations.
    fn resolve_full_address(&self, id: &GlobalId) -> Result<FullAddress>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;

    struct Beacon;

    impl Component for Beacon {
        const COMPONENT_TYPE: ComponentType = ComponentType::new(3);
    }

    struct Other;

    impl Component for Other {
        const COMPONENT_TYPE: ComponentType = ComponentType::new(4);
    }

    #[test]
    fn global_id_raw_roundtrip() {
        let id = GlobalId::new(0x0001_0000_0000_0000, 42);
        assert_eq!(GlobalId::from_raw(id.raw()), id);
        assert_eq!(id.msb(), 0x0001_0000_0000_0000);
        assert_eq!(id.lsb(), 42);
        assert!(id.is_valid());
        assert!(!GlobalId::INVALID.is_valid());
    }

    #[test]
    fn global_id_display() {
        let id = GlobalId::new(1, 0xff);
        assert_eq!(
            format!("{id}"),
            "{0000000000000001, 00000000000000ff}"
        );
        assert!(format!("{id:?}").starts_with("GlobalId("));
    }

    #[test]
    fn pinned_handle_downcasts_to_its_type_only() {
        let handle = LocalHandle::pinned(7, Arc::new(Beacon));
        assert!(handle.is_pinned());
        assert!(handle.downcast::<Beacon>().is_some());
        assert!(handle.downcast::<Other>().is_none());

        let remote = LocalHandle::remote(7);
        assert!(!remote.is_pinned());
        assert!(remote.downcast::<Beacon>().is_none());
        assert!(format!("{remote:?}").contains("0x7"));
    }

    #[test]
    fn resolution_accessors() {
        let addr = Address::new(
            LocalityId::new(2),
            LocalHandle::remote(0x10),
            Beacon::COMPONENT_TYPE,
        );
        let res = Resolution::Remote(addr.clone());
        assert!(!res.is_local());
        assert_eq!(res.address().locality(), LocalityId::new(2));
        assert_eq!(res.into_address().handle().raw(), 0x10);

        let full = FullAddress::new(addr, GlobalId::new(0, 1));
        assert_eq!(full.locality(), LocalityId::new(2));
        assert!(full.to_string().contains("L2"));
    }
}
