//! The transport contract and an in-memory pipe implementation.
//!
//! The engine consumes any bidirectional stream that preserves message
//! boundaries and delivers frames in FIFO order. Writes go through
//! [`MessageTransport`]; inbound frames and connection events are delivered
//! by the transport driver through the socket's `handle_*` methods.

use std::cell::RefCell;

use serde_json::Value;
use tokio::sync::mpsc;

/// Errors surfaced by a transport write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport has been ended or destroyed.
    #[error("transport closed")]
    Closed,

    /// The underlying connection failed.
    #[error("transport failure: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// A bidirectional, ordered, message-boundary-preserving frame sink.
///
/// Implementations must deliver frames to the peer in write order and keep
/// each frame intact as one structured record.
pub trait MessageTransport {
    /// Queue one structured frame for delivery to the peer.
    fn write(&self, frame: Value) -> Result<(), TransportError>;

    /// Finish the outgoing side gracefully.
    fn end(&self);

    /// Tear the connection down immediately.
    fn destroy(&self);
}

/// One half of an in-memory transport pair created by [`pipe`].
///
/// Frames written here appear, in order, on the receiver handed out for the
/// other half. Ending or destroying the transport drops the sender, which
/// the peer's driver observes as end-of-stream.
pub struct PipeTransport {
    tx: RefCell<Option<mpsc::UnboundedSender<Value>>>,
}

impl PipeTransport {
    fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            tx: RefCell::new(Some(tx)),
        }
    }
}

impl MessageTransport for PipeTransport {
    fn write(&self, frame: Value) -> Result<(), TransportError> {
        match &*self.tx.borrow() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn end(&self) {
        self.tx.borrow_mut().take();
    }

    fn destroy(&self) {
        self.tx.borrow_mut().take();
    }
}

/// Create a connected in-memory transport pair.
///
/// Returns `((a, a_inbound), (b, b_inbound))`: frames written to `a` arrive
/// on `b_inbound` and vice versa. Each side's driver forwards its inbound
/// receiver into the socket; a `None` from the receiver means the peer ended
/// its side.
#[allow(clippy::type_complexity)]
pub fn pipe() -> (
    (PipeTransport, mpsc::UnboundedReceiver<Value>),
    (PipeTransport, mpsc::UnboundedReceiver<Value>),
) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
    (
        (PipeTransport::new(a_to_b_tx), b_to_a_rx),
        (PipeTransport::new(b_to_a_tx), a_to_b_rx),
    )
}
