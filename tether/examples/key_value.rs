//! Key-Value Example: two sockets sharing objects over the in-memory pipe.
//!
//! One side exports a small key-value store; the other drives it through a
//! proxy, receives a stubbable cursor object back, and releases it when done.
//!
//! ```bash
//! cargo run --example key_value
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use tether::{MethodError, Remotable, RpcValue, Socket, pipe};
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// The exported object
// ============================================================================

/// A key-value store exposed to the peer.
struct KvStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl KvStore {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(BTreeMap::new()),
        })
    }
}

#[async_trait(?Send)]
impl Remotable for KvStore {
    fn exposed_methods(&self) -> Vec<String> {
        vec![
            "put".to_string(),
            "get".to_string(),
            "snapshot".to_string(),
            "get size".to_string(),
        ]
    }

    async fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue, MethodError> {
        match method {
            "put" => {
                let mut args = args.into_iter();
                let key = expect_text(args.next(), "key")?;
                let value = expect_text(args.next(), "value")?;
                self.entries.borrow_mut().insert(key, value);
                Ok(RpcValue::Null)
            }
            "get" => {
                let key = expect_text(args.into_iter().next(), "key")?;
                match self.entries.borrow().get(&key) {
                    Some(value) => Ok(RpcValue::from(value.as_str())),
                    None => Ok(RpcValue::Null),
                }
            }
            "snapshot" => {
                // Returns a stubbable object: the caller gets a fresh proxy.
                let snapshot: Rc<dyn Remotable> = Rc::new(Snapshot {
                    entries: self.entries.borrow().clone(),
                });
                Ok(RpcValue::Object(snapshot))
            }
            other => Err(MethodError::type_error(format!("no method `{other}`"))),
        }
    }

    async fn get(&self, property: &str) -> Result<RpcValue, MethodError> {
        match property {
            "size" => Ok(RpcValue::from(self.entries.borrow().len() as u64)),
            other => Err(MethodError::type_error(format!("no property `{other}`"))),
        }
    }
}

/// A frozen copy of the store, itself remotely callable.
struct Snapshot {
    entries: BTreeMap<String, String>,
}

#[async_trait(?Send)]
impl Remotable for Snapshot {
    fn exposed_methods(&self) -> Vec<String> {
        vec!["keys".to_string()]
    }

    async fn call(&self, method: &str, _args: Vec<RpcValue>) -> Result<RpcValue, MethodError> {
        match method {
            "keys" => Ok(RpcValue::List(
                self.entries.keys().map(|k| RpcValue::from(k.as_str())).collect(),
            )),
            other => Err(MethodError::type_error(format!("no method `{other}`"))),
        }
    }
}

fn expect_text(value: Option<RpcValue>, name: &str) -> Result<String, MethodError> {
    value
        .as_ref()
        .and_then(RpcValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| MethodError::type_error(format!("`{name}` must be text")))
}

// ============================================================================
// Wiring
// ============================================================================

/// Forward inbound frames into the socket until the peer ends its side.
async fn pump(socket: Socket, mut inbound: UnboundedReceiver<Value>) {
    while let Some(frame) = inbound.recv().await {
        socket.handle_message(frame);
    }
    socket.handle_end();
    socket.handle_close(false);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let ((transport_a, inbound_a), (transport_b, inbound_b)) = pipe();
    let server = Socket::new(Box::new(transport_a));
    let client = Socket::new(Box::new(transport_b));

    tokio::task::spawn_local(pump(server.clone(), inbound_a));
    tokio::task::spawn_local(pump(client.clone(), inbound_b));

    // The server exports the store; the oid travels "out of band" (here: a
    // local variable).
    let store: Rc<dyn Remotable> = KvStore::new();
    let store_oid = server.add_stub(&store)?;
    println!("server exported store as {store_oid}");

    // The announcement also reaches the client, so a proxy is waiting.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let store_proxy = client.get_proxy(&store_oid).expect("store proxy");

    // Drive the store through the proxy.
    store_proxy
        .call(
            "put",
            vec![RpcValue::from("planet"), RpcValue::from("mercury")],
        )?
        .await?;
    store_proxy
        .call("put", vec![RpcValue::from("metal"), RpcValue::from("iron")])?
        .await?;

    let value = store_proxy
        .call("get", vec![RpcValue::from("planet")])?
        .await?;
    println!("get planet -> {value:?}");

    let size = store_proxy.get("size")?.await?;
    println!("size -> {size:?}");

    // A returned stubbable arrives as a fresh proxy.
    let snapshot = store_proxy.call("snapshot", Vec::new())?.await?;
    let snapshot_proxy = snapshot.as_proxy().expect("snapshot proxy");
    let keys = snapshot_proxy.call("keys", Vec::new())?.await?;
    println!("snapshot keys -> {keys:?}");

    // Done with the snapshot: release it on both sides.
    snapshot_proxy.free();

    client.end();
    server.end();
    Ok(())
}

fn main() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(async {
        if let Err(err) = run().await {
            eprintln!("example failed: {err}");
            std::process::exit(1);
        }
    }));
}
