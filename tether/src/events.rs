//! Socket lifecycle events and the awaitable queue delivering them.
//!
//! Transport-level error/end/close notifications are re-emitted to the
//! application through this queue after the engine has run its own closure
//! cascade (failing pending calls first).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use tether_core::TransportError;

/// Lifecycle notification emitted by a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// The transport failed. Pending calls were already rejected when this
    /// event is observed.
    Error(TransportError),
    /// The peer finished its side of the stream.
    End,
    /// The connection is fully closed.
    Closed {
        /// Whether closure was caused by a transport error.
        had_error: bool,
    },
}

/// Queue of socket events with waker-based notification.
pub(crate) struct EventQueue {
    inner: RefCell<EventQueueInner>,
}

struct EventQueueInner {
    queue: VecDeque<SocketEvent>,
    wakers: Vec<Waker>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(EventQueueInner {
                queue: VecDeque::new(),
                wakers: Vec::new(),
            }),
        }
    }

    /// Emit an event, waking every waiting consumer.
    pub fn push(&self, event: SocketEvent) {
        let mut inner = self.inner.borrow_mut();
        inner.queue.push_back(event);
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Take the next event without waiting.
    pub fn try_recv(&self) -> Option<SocketEvent> {
        self.inner.borrow_mut().queue.pop_front()
    }

    /// Wait for the next event.
    pub fn recv(&self) -> RecvEvent<'_> {
        RecvEvent { queue: self }
    }
}

/// Future returned by [`EventQueue::recv`].
pub(crate) struct RecvEvent<'a> {
    queue: &'a EventQueue,
}

impl Future for RecvEvent<'_> {
    type Output = SocketEvent;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.queue.inner.borrow_mut();
        if let Some(event) = inner.queue.pop_front() {
            return Poll::Ready(event);
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
