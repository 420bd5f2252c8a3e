//! Shared harness for end-to-end tests: two sockets wired back-to-back over
//! the in-memory pipe, with every written frame recorded for wire-order
//! assertions.

#![allow(dead_code)]

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use tether::{
    MessageTransport, MethodError, Remotable, RpcValue, Socket, SocketConfig, TransportError,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::LocalSet;

/// Transport wrapper that records every frame it writes.
pub struct Recording<T> {
    inner: T,
    log: Rc<RefCell<Vec<Value>>>,
}

impl<T: MessageTransport> MessageTransport for Recording<T> {
    fn write(&self, frame: Value) -> Result<(), TransportError> {
        self.log.borrow_mut().push(frame.clone());
        self.inner.write(frame)
    }

    fn end(&self) {
        self.inner.end();
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}

/// Two connected sockets plus the frames each one wrote.
pub struct Pair {
    pub a: Socket,
    pub b: Socket,
    pub a_writes: Rc<RefCell<Vec<Value>>>,
    pub b_writes: Rc<RefCell<Vec<Value>>>,
}

/// Opt-in tracing for debugging test runs: `TETHER_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TETHER_LOG"))
        .with_test_writer()
        .try_init();
}

/// Run `body` against a connected socket pair inside a `LocalSet`, with pump
/// tasks forwarding each side's inbound frames.
pub async fn with_pair<F, Fut>(body: F)
where
    F: FnOnce(Pair) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async move {
            let ((transport_a, inbound_a), (transport_b, inbound_b)) = tether::pipe();
            let a_writes = Rc::new(RefCell::new(Vec::new()));
            let b_writes = Rc::new(RefCell::new(Vec::new()));

            let a = Socket::with_config(
                Box::new(Recording {
                    inner: transport_a,
                    log: Rc::clone(&a_writes),
                }),
                SocketConfig::with_host_label("peer-a"),
            );
            let b = Socket::with_config(
                Box::new(Recording {
                    inner: transport_b,
                    log: Rc::clone(&b_writes),
                }),
                SocketConfig::with_host_label("peer-b"),
            );

            tokio::task::spawn_local(pump(a.clone(), inbound_a));
            tokio::task::spawn_local(pump(b.clone(), inbound_b));

            body(Pair {
                a,
                b,
                a_writes,
                b_writes,
            })
            .await;
        })
        .await;
}

/// Forward inbound frames into the socket until the peer ends its side.
async fn pump(socket: Socket, mut inbound: UnboundedReceiver<Value>) {
    while let Some(frame) = inbound.recv().await {
        socket.handle_message(frame);
    }
    socket.handle_end();
    socket.handle_close(false);
}

/// Let the pumps and spawned tasks drain.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// The canonical test object: one string value, one method that checks its
/// argument, plus the `value` property exposed through `get value`.
pub struct MyObject {
    value: RefCell<String>,
}

impl MyObject {
    pub fn new(value: &str) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value.to_string()),
        })
    }
}

#[async_trait(?Send)]
impl Remotable for MyObject {
    fn exposed_methods(&self) -> Vec<String> {
        vec![
            "frobnicate".to_string(),
            "getValue".to_string(),
            "get value".to_string(),
        ]
    }

    async fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue, MethodError> {
        match method {
            "frobnicate" => {
                if let Some(first) = args.first()
                    && first.as_str() != Some("x")
                {
                    return Err(MethodError::type_error("expected \"x\""));
                }
                Ok(RpcValue::from(42i64))
            }
            "getValue" => Ok(RpcValue::from(self.value.borrow().as_str())),
            other => Err(MethodError::type_error(format!("no method `{other}`"))),
        }
    }

    async fn get(&self, property: &str) -> Result<RpcValue, MethodError> {
        match property {
            "value" => Ok(RpcValue::from(self.value.borrow().as_str())),
            other => Err(MethodError::type_error(format!(
                "no readable property `{other}`"
            ))),
        }
    }

    async fn set(&self, property: &str, value: RpcValue) -> Result<(), MethodError> {
        match property {
            "value" => {
                let text = value
                    .as_str()
                    .ok_or_else(|| MethodError::type_error("value must be text"))?;
                *self.value.borrow_mut() = text.to_string();
                Ok(())
            }
            other => Err(MethodError::type_error(format!(
                "no writable property `{other}`"
            ))),
        }
    }
}

/// Unwrap text out of a reply value.
pub fn text(value: &RpcValue) -> &str {
    value.as_str().expect("text value")
}
