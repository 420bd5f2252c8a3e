//! Stub registry: locally exported objects keyed by oid.
//!
//! The id map holds the only strong reference the engine keeps to an
//! application object; it is removable solely through [`FreeHandle::free`]
//! or a `free` frame from the peer. The identity association (object → oid)
//! is weak, so a long-lived but already-freed stub cannot keep its object
//! alive through the back-pointer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tether_core::{Oid, OidAllocator};

use crate::error::RpcError;
use crate::remotable::Remotable;

/// One exported object: target plus its method snapshot.
#[derive(Clone)]
pub(crate) struct StubEntry {
    /// The application object.
    pub target: Rc<dyn Remotable>,
    /// Methods snapshot at stub creation.
    pub methods: Vec<String>,
}

pub(crate) type StubMap = HashMap<Oid, StubEntry>;

struct IdentityEntry {
    target: Weak<dyn Remotable>,
    oid: Oid,
}

/// Outcome of [`StubRegistry::add_stub`]: the oid plus the announcement to
/// emit, when the stub was installed or re-installed.
#[derive(Debug)]
pub(crate) struct Registered {
    pub oid: Oid,
    pub announce: Option<Vec<String>>,
}

/// Registry of locally exported objects.
pub(crate) struct StubRegistry {
    stubs: Rc<RefCell<StubMap>>,
    identity: RefCell<HashMap<*const (), IdentityEntry>>,
    allocator: OidAllocator,
}

impl StubRegistry {
    pub fn new(allocator: OidAllocator) -> Self {
        Self {
            stubs: Rc::new(RefCell::new(HashMap::new())),
            identity: RefCell::new(HashMap::new()),
            allocator,
        }
    }

    /// Register `target`, reusing its oid while the association is alive.
    ///
    /// Idempotent while the stub is live. A target whose stub was freed is
    /// re-installed under its old oid and re-announced. A never-seen target
    /// gets a fresh oid, a method snapshot, and an announcement.
    pub fn add_stub(&self, target: &Rc<dyn Remotable>) -> Result<Registered, RpcError> {
        let key = Rc::as_ptr(target) as *const ();
        if let Some(oid) = self.known_oid(key, target) {
            if self.stubs.borrow().contains_key(&oid) {
                return Ok(Registered {
                    oid,
                    announce: None,
                });
            }
            // Freed earlier: re-install under the same oid and re-announce.
            let methods = snapshot(target)?;
            self.stubs.borrow_mut().insert(
                oid.clone(),
                StubEntry {
                    target: Rc::clone(target),
                    methods: methods.clone(),
                },
            );
            tracing::debug!(oid = %oid, "stub re-exported");
            return Ok(Registered {
                oid,
                announce: Some(methods),
            });
        }

        let methods = snapshot(target)?;
        let oid = self.allocator.next();
        self.stubs.borrow_mut().insert(
            oid.clone(),
            StubEntry {
                target: Rc::clone(target),
                methods: methods.clone(),
            },
        );
        self.identity.borrow_mut().insert(
            key,
            IdentityEntry {
                target: Rc::downgrade(target),
                oid: oid.clone(),
            },
        );
        tracing::debug!(oid = %oid, methods = methods.len(), "stub exported");
        Ok(Registered {
            oid,
            announce: Some(methods),
        })
    }

    /// The oid previously associated with this exact object, if the
    /// association is still valid. Stale entries (dead weak, or an address
    /// reused by a different allocation) are purged on touch.
    fn known_oid(&self, key: *const (), target: &Rc<dyn Remotable>) -> Option<Oid> {
        let mut identity = self.identity.borrow_mut();
        match identity.get(&key) {
            Some(entry) => match entry.target.upgrade() {
                Some(live) if Rc::ptr_eq(&live, target) => Some(entry.oid.clone()),
                _ => {
                    identity.remove(&key);
                    None
                }
            },
            None => None,
        }
    }

    pub fn lookup(&self, oid: &Oid) -> Option<StubEntry> {
        self.stubs.borrow().get(oid).cloned()
    }

    #[cfg(test)]
    pub fn contains(&self, oid: &Oid) -> bool {
        self.stubs.borrow().contains_key(oid)
    }

    /// Remove the stub; the object itself lives on. Returns whether the oid
    /// was present.
    pub fn remove(&self, oid: &Oid) -> bool {
        self.stubs.borrow_mut().remove(oid).is_some()
    }

    /// Capability to withdraw `oid`, holding the id map but not the socket.
    pub fn free_handle(&self, oid: &Oid) -> FreeHandle {
        FreeHandle {
            oid: oid.clone(),
            stubs: Rc::clone(&self.stubs),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.stubs.borrow().len()
    }
}

/// Capability to withdraw one stub from the id map.
///
/// Deliberately holds the map rather than the socket, so that handing it to
/// an application object never keeps the endpoint reachable from the
/// application's object graph.
pub struct FreeHandle {
    oid: Oid,
    stubs: Rc<RefCell<StubMap>>,
}

impl FreeHandle {
    /// The stub this handle releases.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Remove the oid from the id map. The object lives on, and the identity
    /// association survives so a later re-export re-announces the same oid.
    pub fn free(&self) {
        if self.stubs.borrow_mut().remove(&self.oid).is_some() {
            tracing::debug!(oid = %self.oid, "stub freed locally");
        }
    }
}

fn snapshot(target: &Rc<dyn Remotable>) -> Result<Vec<String>, RpcError> {
    let methods = target.exposed_methods();
    if methods.is_empty() {
        return Err(RpcError::NotStubbable);
    }
    Ok(methods)
}
