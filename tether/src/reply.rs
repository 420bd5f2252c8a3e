//! Pending-call correlation and the reply future.
//!
//! Every outbound call parks a resolver keyed by a per-endpoint monotonic
//! callId. The resolver is consumed exactly once: by a matching reply frame,
//! by a failed write, or by the closure cascade.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::RpcError;
use crate::value::RpcValue;

pub(crate) type ReplyResult = Result<RpcValue, RpcError>;

/// Table of calls awaiting replies, keyed by callId.
pub(crate) struct PendingCalls {
    next_id: Cell<u64>,
    table: RefCell<HashMap<u64, oneshot::Sender<ReplyResult>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            table: RefCell::new(HashMap::new()),
        }
    }

    /// Allocate a fresh callId and park its resolver.
    pub fn register(&self) -> (u64, oneshot::Receiver<ReplyResult>) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let (tx, rx) = oneshot::channel();
        self.table.borrow_mut().insert(id, tx);
        (id, rx)
    }

    /// Settle `id` with `result`. Returns false when the id is unknown.
    pub fn settle(&self, id: u64, result: ReplyResult) -> bool {
        match self.table.borrow_mut().remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Forget `id` without settling (the call frame never left).
    pub fn discard(&self, id: u64) {
        self.table.borrow_mut().remove(&id);
    }

    /// Reject every pending call with a clone of `error`.
    pub fn fail_all(&self, error: &RpcError) {
        let drained: Vec<_> = self.table.borrow_mut().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }
}

/// Future resolving to a call's unmarshalled reply.
///
/// Settled exactly once: by the matching `reply` frame, or by the uniform
/// closed-endpoint error when the socket goes down first.
#[derive(Debug)]
pub struct ReplyFuture {
    rx: oneshot::Receiver<ReplyResult>,
}

impl ReplyFuture {
    pub(crate) fn new(rx: oneshot::Receiver<ReplyResult>) -> Self {
        Self { rx }
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The resolver was dropped with the socket.
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::SocketClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
