//! Object identifiers and their allocation.
//!
//! An [`Oid`] names one stubbed object for the lifetime of the endpoint that
//! exported it. Identifiers are opaque strings of the form
//! `<host>-<pid>:<socketSeq>:<counter>`; the counter is monotonically
//! increasing per endpoint, so an oid is never reused within one endpoint.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned to a stub at its owning endpoint.
///
/// Oids are compared as plain strings; the internal structure exists only to
/// make them unique across endpoints and readable in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Wrap an identifier received from the wire or a peer.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Oid {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Oid {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Allocates oids unique within one endpoint.
///
/// The prefix binds identifiers to this process and socket; the counter
/// makes them unique within the endpoint. Uses `Cell` for single-threaded
/// increment, matching the engine's cooperative scheduling model.
#[derive(Debug)]
pub struct OidAllocator {
    prefix: String,
    counter: Cell<u64>,
}

impl OidAllocator {
    /// Create an allocator for the endpoint identified by `host` and
    /// `socket_seq` (see [`next_socket_seq`]).
    pub fn new(host: &str, socket_seq: u64) -> Self {
        Self {
            prefix: format!("{}-{}:{}", host, std::process::id(), socket_seq),
            counter: Cell::new(0),
        }
    }

    /// Allocate the next oid. Never returns the same value twice.
    pub fn next(&self) -> Oid {
        let n = self.counter.get();
        self.counter.set(n + 1);
        Oid(format!("{}:{}", self.prefix, n))
    }
}

/// Process-wide socket sequence number.
///
/// Each endpoint takes one of these at construction so that two sockets in
/// the same process can never allocate colliding oids.
pub fn next_socket_seq() -> u64 {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    SEQ.fetch_add(1, Ordering::Relaxed)
}
