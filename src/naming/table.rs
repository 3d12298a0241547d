//! In-process address table.
//!
//! [`AddressTable`] is the resolver for one locality: it owns the live
//! components bound in this locality and remembers where known remote
//! identities live. Identities minted here carry the locality in the upper
//! 32 bits of their most significant word, so they never collide with
//! another locality's.

use super::{Address, FullAddress, GlobalId, LocalHandle, LocalityId, Resolution, Resolver};
use crate::component::{exposes_base, Component, ComponentType};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
enum Binding {
    Local {
        handle: LocalHandle,
        component_type: ComponentType,
    },
    Remote(Address),
}

/// Marks an identity as minted by an address table. Keeps `msb` nonzero
/// for every locality, `u32::MAX` included.
const MINTED: u64 = 1;

fn minted_msb(here: LocalityId) -> u64 {
    (u64::from(here.raw()) << 32) | MINTED
}

/// Resolver backed by an in-memory table.
pub struct AddressTable {
    here: LocalityId,
    bindings: RwLock<HashMap<GlobalId, Binding>>,
    next_id: AtomicU64,
    next_handle: AtomicU64,
}

impl AddressTable {
    /// Creates an empty table for `here`.
    #[must_use]
    pub fn new(here: LocalityId) -> Self {
        Self {
            here,
            bindings: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Mints a fresh identity owned by this locality.
    #[must_use]
    pub fn allocate_id(&self) -> GlobalId {
        let lsb = self.next_id.fetch_add(1, Ordering::Relaxed);
        GlobalId::new(minted_msb(self.here), lsb)
    }

    /// Binds a component in this locality and returns its new identity.
    pub fn bind_local<C: Component>(&self, component: C) -> GlobalId {
        self.bind_local_arc(Arc::new(component))
    }

    /// Binds a shared component in this locality and returns its new identity.
    ///
    /// # Panics
    ///
    /// Panics if `C` has a derived type but does not expose its base
    /// component, since base-type actions could then never reach it.
    pub fn bind_local_arc<C: Component>(&self, component: Arc<C>) -> GlobalId {
        if !exposes_base(component.as_ref()) {
            tracing::error!(
                component_type = %C::COMPONENT_TYPE,
                "derived component does not expose its base"
            );
            panic!(
                "component type {} must expose a {} base component",
                C::COMPONENT_TYPE,
                C::COMPONENT_TYPE.base()
            );
        }
        let id = self.allocate_id();
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let binding = Binding::Local {
            handle: LocalHandle::pinned(raw, component),
            component_type: C::COMPONENT_TYPE,
        };
        self.bindings.write().insert(id, binding);
        tracing::trace!(id = %id, locality = %self.here, handle = raw, "bound local component");
        id
    }

    /// Records that `id` lives at `address` in another locality.
    ///
    /// Returns the previous remote binding, if any. Binding an address that
    /// names this locality is rejected because no live instance backs it.
    pub fn bind_remote(&self, id: GlobalId, address: Address) -> Result<Option<Address>> {
        if address.locality() == self.here {
            return Err(Error::internal(format!(
                "remote binding for {id} names the local locality {}",
                self.here
            ))
            .with_target(id));
        }
        let previous = self.bindings.write().insert(id, Binding::Remote(address));
        Ok(match previous {
            Some(Binding::Remote(addr)) => Some(addr),
            _ => None,
        })
    }

    /// Removes any binding for `id`. Returns true if one existed.
    pub fn unbind(&self, id: &GlobalId) -> bool {
        self.bindings.write().remove(id).is_some()
    }

    /// Returns true if `id` is bound (locally or remotely).
    #[must_use]
    pub fn contains(&self, id: &GlobalId) -> bool {
        self.bindings.read().contains_key(id)
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns true if no identity is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the local handle bound to `id`, if it lives here.
    #[must_use]
    pub fn local_handle(&self, id: &GlobalId) -> Option<LocalHandle> {
        match self.bindings.read().get(id)? {
            Binding::Local { handle, .. } => Some(handle.clone()),
            Binding::Remote(_) => None,
        }
    }

    /// Builds the address other localities should use to reach `id`.
    ///
    /// The returned address carries an unpinned handle, suitable for
    /// [`AddressTable::bind_remote`] on a peer.
    #[must_use]
    pub fn export(&self, id: &GlobalId) -> Option<Address> {
        match self.bindings.read().get(id)? {
            Binding::Local {
                handle,
                component_type,
            } => Some(Address::new(
                self.here,
                LocalHandle::remote(handle.raw()),
                *component_type,
            )),
            Binding::Remote(_) => None,
        }
    }

    fn lookup(&self, id: &GlobalId) -> Result<Resolution> {
        let bindings = self.bindings.read();
        match bindings.get(id) {
            Some(Binding::Local {
                handle,
                component_type,
            }) => Ok(Resolution::Local(Address::new(
                self.here,
                handle.clone(),
                *component_type,
            ))),
            Some(Binding::Remote(addr)) => Ok(Resolution::Remote(addr.clone())),
            None => Err(Error::unresolved_target(*id)),
        }
    }
}

impl Resolver for AddressTable {
    fn here(&self) -> LocalityId {
        self.here
    }

    fn resolve_locality(&self, id: &GlobalId) -> Result<Resolution> {
        self.lookup(id)
    }

    fn resolve_full_address(&self, id: &GlobalId) -> Result<FullAddress> {
        let address = self.lookup(id)?.into_address();
        Ok(FullAddress::new(address, *id))
    }
}

impl fmt::Debug for AddressTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressTable")
            .field("here", &self.here)
            .field("bindings", &self.len())
            .finish_non_exhaustive()
    }
}
