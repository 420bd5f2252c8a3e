//! The socket endpoint: outbound call dispatch, lifecycle, closure cascade.
//!
//! One [`Socket`] wraps one transport and owns both registries, the
//! pending-call table, and the announcement buffer. It is single-threaded:
//! state lives behind `Cell`/`RefCell`, and the only suspension points are
//! awaiting a remote reply or an application method's own awaits.
//!
//! Inbound traffic is delivered by the transport driver through the
//! `handle_*` methods; the driver owns the read loop, the socket owns
//! everything else.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde_json::Value;
use tether_core::{
    Frame, MessageTransport, Oid, OidAllocator, TaskProvider, TokioTaskProvider, TransportError,
    next_socket_seq,
};

use crate::error::RpcError;
use crate::events::{EventQueue, SocketEvent};
use crate::marshal::{Announcement, marshal};
use crate::proxy::{Proxy, ProxyRegistry};
use crate::remotable::Remotable;
use crate::reply::{PendingCalls, ReplyFuture};
use crate::router;
use crate::stub::{FreeHandle, StubRegistry};
use crate::value::RpcValue;

/// Configuration for a socket endpoint.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Host label used in this endpoint's oid prefix.
    pub host_label: String,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host_label: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        }
    }
}

impl SocketConfig {
    /// Configuration with an explicit host label.
    pub fn with_host_label(host_label: impl Into<String>) -> Self {
        Self {
            host_label: host_label.into(),
        }
    }
}

/// Endpoint state shared between the socket, its proxies, and spawned
/// inbound-call tasks.
pub(crate) struct SocketShared {
    transport: Box<dyn MessageTransport>,
    tasks: Box<dyn TaskProvider>,
    pub(crate) stubs: StubRegistry,
    pub(crate) proxies: ProxyRegistry,
    pub(crate) pending: PendingCalls,
    pub(crate) announce_buffer: RefCell<Vec<Announcement>>,
    in_call: Cell<bool>,
    closed: Cell<bool>,
    pub(crate) events: EventQueue,
}

impl SocketShared {
    /// Write one frame, unless the endpoint is closed (writes after closure
    /// are suppressed).
    pub(crate) fn write_frame(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.get() {
            tracing::trace!("write suppressed after close");
            return Err(TransportError::Closed);
        }
        self.transport.write(frame.into_value())
    }

    /// Drain the announcement buffer onto the wire, in order.
    pub(crate) fn flush_announcements(&self) {
        let drained: Vec<Announcement> = self.announce_buffer.borrow_mut().drain(..).collect();
        for announcement in drained {
            tracing::debug!(oid = %announcement.oid, "announcing stub");
            if let Err(err) = self.write_frame(Frame::NewObject {
                obj: announcement.oid,
                methods: announcement.methods,
            }) {
                tracing::warn!(error = %err, "failed to announce stub");
            }
        }
    }

    /// Announce a stub now, or buffer it while a call is marshalling so the
    /// announcement precedes the call frame on the wire.
    fn announce_or_buffer(&self, oid: Oid, methods: Vec<String>) {
        if self.in_call.get() {
            self.announce_buffer
                .borrow_mut()
                .push(Announcement { oid, methods });
        } else {
            tracing::debug!(oid = %oid, "announcing stub");
            if let Err(err) = self.write_frame(Frame::NewObject { obj: oid, methods }) {
                tracing::warn!(error = %err, "failed to announce stub");
            }
        }
    }

    /// Start an outbound call.
    pub(crate) fn call(
        self: &Rc<Self>,
        oid: &Oid,
        method: &str,
        args: Vec<RpcValue>,
    ) -> Result<ReplyFuture, RpcError> {
        if self.closed.get() {
            return Err(RpcError::SocketClosed);
        }
        if self.in_call.get() {
            return Err(RpcError::ReentrantCall);
        }

        self.in_call.set(true);
        let marshalled: Result<Vec<Value>, RpcError> = args
            .iter()
            .map(|arg| marshal(&self.stubs, &self.proxies, arg, &self.announce_buffer))
            .collect();
        self.in_call.set(false);

        // Stubs registered before a failing branch stay registered; flushing
        // their announcements keeps the announce-before-use invariant intact
        // for any later call that reuses them.
        self.flush_announcements();

        // A marshalling failure propagates without consuming a callId.
        let params = marshalled?;

        let (id, rx) = self.pending.register();
        let frame = Frame::Call {
            id,
            obj: oid.clone(),
            method: method.to_string(),
            params,
        };
        if let Err(err) = self.write_frame(frame) {
            self.pending.discard(id);
            return Err(RpcError::Transport(err));
        }
        tracing::trace!(id, obj = %oid, method, "call dispatched");
        Ok(ReplyFuture::new(rx))
    }

    /// Release a proxy: remove it locally and notify the peer unless the
    /// endpoint is closed (free writes are discarded after closure).
    pub(crate) fn free_proxy(&self, oid: &Oid) {
        if self.proxies.remove(oid).is_none() {
            return;
        }
        tracing::debug!(oid = %oid, "proxy freed");
        if let Err(err) = self.write_frame(Frame::Free { id: oid.clone() }) {
            tracing::trace!(error = %err, "free notice discarded");
        }
    }

    pub(crate) fn spawn(&self, name: &'static str, future: Pin<Box<dyn Future<Output = ()>>>) {
        self.tasks.spawn_task(name, future);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Mark the endpoint closed and reject every pending call with the
    /// uniform closed-endpoint error. Idempotent.
    fn shutdown(&self) {
        if !self.closed.replace(true) {
            tracing::debug!(pending = self.pending.len(), "socket closed");
        }
        self.pending.fail_all(&RpcError::SocketClosed);
    }
}

/// One side of the bidirectional RPC channel.
///
/// Cloning is cheap and shares the endpoint state; drivers typically hold a
/// clone for the read loop and hand another to the application.
#[derive(Clone)]
pub struct Socket {
    shared: Rc<SocketShared>,
}

impl Socket {
    /// Wrap a transport with the default configuration.
    pub fn new(transport: Box<dyn MessageTransport>) -> Self {
        Self::with_config(transport, SocketConfig::default())
    }

    /// Wrap a transport with an explicit configuration.
    pub fn with_config(transport: Box<dyn MessageTransport>, config: SocketConfig) -> Self {
        let allocator = OidAllocator::new(&config.host_label, next_socket_seq());
        Self {
            shared: Rc::new(SocketShared {
                transport,
                tasks: Box::new(TokioTaskProvider),
                stubs: StubRegistry::new(allocator),
                proxies: ProxyRegistry::new(),
                pending: PendingCalls::new(),
                announce_buffer: RefCell::new(Vec::new()),
                in_call: Cell::new(false),
                closed: Cell::new(false),
                events: EventQueue::new(),
            }),
        }
    }

    /// Export `target` to the peer, returning its oid.
    ///
    /// Idempotent while the stub is live; a freed target re-exports under
    /// its old oid with a fresh announcement. The first oid of a connection
    /// is conveyed to the peer out of band; subsequent stubs ride inline as
    /// `new-object` frames.
    pub fn add_stub(&self, target: &Rc<dyn Remotable>) -> Result<Oid, RpcError> {
        let registered = self.shared.stubs.add_stub(target)?;
        if let Some(methods) = registered.announce {
            self.shared
                .announce_or_buffer(registered.oid.clone(), methods);
        }
        Ok(registered.oid)
    }

    /// Start a call against one of the peer's stubs.
    ///
    /// Fails immediately, without touching the transport, when the
    /// endpoint is closed or another call is mid-marshal.
    pub fn call(
        &self,
        oid: &Oid,
        method: &str,
        args: Vec<RpcValue>,
    ) -> Result<ReplyFuture, RpcError> {
        SocketShared::call(&self.shared, oid, method, args)
    }

    /// The proxy registered for `oid`, if any.
    pub fn get_proxy(&self, oid: &Oid) -> Option<Rc<Proxy>> {
        self.shared.proxies.get(oid)
    }

    /// Release the proxy for `oid` and notify the peer (unless closed).
    pub fn free_proxy(&self, oid: &Oid) {
        self.shared.free_proxy(oid);
    }

    /// Capability to withdraw the stub `oid` without going through the
    /// socket. The handle holds the id map only, never the endpoint, so
    /// giving it to an application object does not keep the socket alive.
    pub fn free_handle(&self, oid: &Oid) -> FreeHandle {
        self.shared.stubs.free_handle(oid)
    }

    /// Close the endpoint gracefully: reject pending calls, end the
    /// transport. New calls fail with a closed-endpoint error.
    pub fn end(&self) {
        self.shared.shutdown();
        self.shared.transport.end();
    }

    /// Force immediate closure.
    pub fn destroy(&self) {
        self.shared.shutdown();
        self.shared.transport.destroy();
    }

    /// Whether the endpoint has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Wait for the next lifecycle event.
    pub async fn next_event(&self) -> SocketEvent {
        self.shared.events.recv().await
    }

    /// Take the next lifecycle event without waiting.
    pub fn try_next_event(&self) -> Option<SocketEvent> {
        self.shared.events.try_recv()
    }

    /// Driver entry: one inbound frame. Frames received after closure are
    /// ignored; malformed frames are answered or dropped, never fatal.
    pub fn handle_message(&self, frame: Value) {
        if self.shared.closed.get() {
            tracing::trace!("frame ignored after close");
            return;
        }
        router::route(&self.shared, frame);
    }

    /// Driver entry: the transport failed. Rejects every pending call with
    /// the closed-endpoint error, then re-emits the error as an event.
    pub fn handle_error(&self, error: TransportError) {
        tracing::error!(error = %error, "transport error");
        self.shared.shutdown();
        self.shared.events.push(SocketEvent::Error(error));
    }

    /// Driver entry: the peer finished its side of the stream.
    pub fn handle_end(&self) {
        self.shared.shutdown();
        self.shared.events.push(SocketEvent::End);
    }

    /// Driver entry: the connection is fully closed.
    pub fn handle_close(&self, had_error: bool) {
        self.shared.shutdown();
        self.shared.events.push(SocketEvent::Closed { had_error });
    }
}
