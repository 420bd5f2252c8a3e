//! # Tether Core
//!
//! Addressing and wire vocabulary shared by the tether RPC engine and its
//! transport drivers.
//!
//! This crate deliberately knows nothing about stubs, proxies, or call
//! dispatch. It provides:
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Oid`] / [`OidAllocator`] | Endpoint-unique object identifiers |
//! | [`Frame`] | The four control frames exchanged between endpoints |
//! | [`MessageTransport`] | The message-boundary-preserving transport contract |
//! | [`pipe`] | An in-memory transport pair for tests and examples |
//! | [`TaskProvider`] | Object-safe seam for spawning current-thread tasks |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Wire frames and the `{oid}` argument marker.
pub mod frame;

/// Object identifiers and their allocation.
pub mod oid;

/// Task spawning seam for single-threaded runtimes.
pub mod task;

/// The transport contract and an in-memory pipe implementation.
pub mod transport;

pub use frame::{Frame, FrameError, as_oid_marker, oid_marker};
pub use oid::{Oid, OidAllocator, next_socket_seq};
pub use task::{TaskProvider, TokioTaskProvider};
pub use transport::{MessageTransport, PipeTransport, TransportError, pipe};
