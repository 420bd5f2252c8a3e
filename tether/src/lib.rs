//! # Tether
//!
//! Bidirectional, promise-oriented object RPC between two peers.
//!
//! Each side exposes in-process objects to the other as if they were local:
//! callers hold remote [`Proxy`] handles whose method invocations and
//! property reads become asynchronous request/reply exchanges, while stubbed
//! objects on the far side execute methods and return plain data or further
//! stubbed objects (which appear as fresh proxies on the caller).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Application Code                    │
//! │      implements Remotable, holds proxies         │
//! ├─────────────────────────────────────────────────┤
//! │     Socket (call dispatch + lifecycle)           │
//! │     • callId correlation, re-entrancy guard      │
//! │     • closure cascade over pending calls         │
//! ├─────────────────────────────────────────────────┤
//! │     Registries + Marshaller                      │
//! │     • stubs by oid (strong), identity map (weak) │
//! │     • proxies by oid, `{oid}` marker rewrite     │
//! ├─────────────────────────────────────────────────┤
//! │     MessageTransport (tether-core)               │
//! │     • ordered, boundary-preserving frames        │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Socket`] | One endpoint: registries, pending calls, lifecycle |
//! | [`Remotable`] | Contract for application objects exported to the peer |
//! | [`Proxy`] | Handle for an object owned by the peer |
//! | [`RpcValue`] | Argument/return currency: data plus live objects |
//! | [`ReplyFuture`] | Promise for an in-flight call's reply |
//!
//! ## Quick start
//!
//! ```ignore
//! use tether::{Socket, RpcValue};
//! use tether_core::pipe;
//!
//! let ((transport, inbound), peer_side) = pipe();
//! let socket = Socket::new(Box::new(transport));
//!
//! // Export an object; send the oid to the peer out of band.
//! let oid = socket.add_stub(&(object as std::rc::Rc<dyn tether::Remotable>))?;
//!
//! // Call a stub the peer told us about.
//! let reply = socket.call(&remote_oid, "frobnicate", vec![RpcValue::from("x")])?.await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Error types for the RPC engine.
pub mod error;

mod events;
mod marshal;
mod proxy;
mod remotable;
mod reply;
mod router;
mod socket;
mod stub;
mod value;

pub use error::{
    ERR_INVALID_OBJECT, ERR_SOCKET_CLOSED, ErrorClass, MethodError, RemoteError, RpcError,
};
pub use events::SocketEvent;
pub use proxy::Proxy;
pub use remotable::Remotable;
pub use reply::ReplyFuture;
pub use socket::{Socket, SocketConfig};
pub use stub::FreeHandle;
pub use value::RpcValue;

// Re-export core vocabulary for convenience.
pub use tether_core::{
    Frame, MessageTransport, Oid, OidAllocator, PipeTransport, TaskProvider, TokioTaskProvider,
    TransportError, pipe,
};
