//! Remote-reference handles and their registry.
//!
//! A [`Proxy`] stands in for an object owned by the peer. It is created when
//! a `new-object` frame arrives for an unknown oid, keeps its identity across
//! repeated announcements of the same oid, and is destroyed by
//! [`Proxy::free`], which also notifies the peer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tether_core::Oid;

use crate::error::RpcError;
use crate::reply::ReplyFuture;
use crate::socket::SocketShared;
use crate::value::RpcValue;

/// Local handle for an object owned by the peer.
///
/// For each declared plain method the proxy offers [`Proxy::call`]; for each
/// declared `get NAME` it offers the lazily resolving [`Proxy::get`]. Only
/// the getter is generated; writes stay reachable through a raw
/// `Socket::call` with `set NAME`, but the proxy surface is read-only.
pub struct Proxy {
    oid: Oid,
    methods: Vec<String>,
    socket: Weak<SocketShared>,
}

impl Proxy {
    pub(crate) fn new(oid: Oid, methods: Vec<String>, socket: Weak<SocketShared>) -> Rc<Self> {
        Rc::new(Self {
            oid,
            methods,
            socket,
        })
    }

    /// Identifier of the remote object this proxy stands in for.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// The method snapshot announced by the peer.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Whether `method` is a declared plain method.
    ///
    /// Entries carrying the reserved `get ` prefix are property
    /// declarations, not methods.
    pub fn has_method(&self, method: &str) -> bool {
        !method.starts_with("get ") && self.methods.iter().any(|entry| entry == method)
    }

    /// Whether `property` was declared as `get NAME`.
    pub fn has_property(&self, property: &str) -> bool {
        self.methods
            .iter()
            .any(|entry| entry.strip_prefix("get ") == Some(property))
    }

    /// Invoke a declared method on the remote object.
    ///
    /// An undeclared method fails with an invalid-method error without
    /// touching the wire; it is simply absent from the proxy.
    pub fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<ReplyFuture, RpcError> {
        if !self.has_method(method) {
            return Err(RpcError::InvalidMethod {
                method: method.to_string(),
            });
        }
        let socket = self.socket.upgrade().ok_or(RpcError::SocketClosed)?;
        SocketShared::call(&socket, &self.oid, method, args)
    }

    /// Read a declared property from the remote object.
    pub fn get(&self, property: &str) -> Result<ReplyFuture, RpcError> {
        if !self.has_property(property) {
            return Err(RpcError::InvalidMethod {
                method: format!("get {property}"),
            });
        }
        let socket = self.socket.upgrade().ok_or(RpcError::SocketClosed)?;
        SocketShared::call(&socket, &self.oid, &format!("get {property}"), Vec::new())
    }

    /// Release this handle: remove it from the registry and notify the peer.
    ///
    /// If the socket is already closed the local removal still happens and
    /// no message is sent.
    pub fn free(&self) {
        if let Some(socket) = self.socket.upgrade() {
            socket.free_proxy(&self.oid);
        }
    }
}

/// Registry of proxies keyed by oid.
pub(crate) struct ProxyRegistry {
    proxies: RefCell<HashMap<Oid, Rc<Proxy>>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            proxies: RefCell::new(HashMap::new()),
        }
    }

    /// Construct a proxy for `oid` unless one exists; returns the stable
    /// instance either way.
    pub fn insert_if_unknown(
        &self,
        oid: Oid,
        methods: Vec<String>,
        socket: Weak<SocketShared>,
    ) -> Rc<Proxy> {
        let mut proxies = self.proxies.borrow_mut();
        if let Some(existing) = proxies.get(&oid) {
            return Rc::clone(existing);
        }
        tracing::debug!(oid = %oid, methods = methods.len(), "proxy created");
        let proxy = Proxy::new(oid.clone(), methods, socket);
        proxies.insert(oid, Rc::clone(&proxy));
        proxy
    }

    pub fn get(&self, oid: &Oid) -> Option<Rc<Proxy>> {
        self.proxies.borrow().get(oid).cloned()
    }

    pub fn remove(&self, oid: &Oid) -> Option<Rc<Proxy>> {
        self.proxies.borrow_mut().remove(oid)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.proxies.borrow().len()
    }
}
