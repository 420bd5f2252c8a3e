//! Wire-level and lifecycle invariants observed across a socket pair.

mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use tether::{MethodError, Oid, Remotable, RpcError, RpcValue, Socket};

use support::{MyObject, settle, with_pair};

/// Collect every oid appearing anywhere inside a value tree as an `{oid}`
/// marker.
fn collect_markers(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_markers(item, out);
            }
        }
        Value::Object(map) => {
            if map.len() == 1
                && let Some(oid) = map.get("oid").and_then(Value::as_str)
            {
                out.push(oid.to_string());
                return;
            }
            for item in map.values() {
                collect_markers(item, out);
            }
        }
        _ => {}
    }
}

/// Check invariant: every oid referenced by a `call` frame's params was
/// introduced by a strictly earlier `new-object` frame in the same log.
fn assert_announce_before_use(log: &[Value]) {
    let mut announced: Vec<String> = Vec::new();
    for frame in log {
        let control = frame.get("control").and_then(Value::as_str);
        match control {
            Some("new-object") => {
                if let Some(oid) = frame.get("obj").and_then(Value::as_str) {
                    announced.push(oid.to_string());
                }
            }
            Some("call") | Some("reply") => {
                let payload = if control == Some("call") {
                    frame.get("params")
                } else {
                    frame.get("reply")
                };
                if let Some(payload) = payload {
                    let mut used = Vec::new();
                    collect_markers(payload, &mut used);
                    for oid in used {
                        // A marker may also reference an oid owned by the
                        // *receiving* side (a proxy round-tripping home);
                        // those never appear in this direction's
                        // announcements, so only locally announced oids are
                        // checked for ordering.
                        let locally_owned = log.iter().any(|f| {
                            f.get("control").and_then(Value::as_str) == Some("new-object")
                                && f.get("obj").and_then(Value::as_str) == Some(oid.as_str())
                        });
                        if locally_owned {
                            assert!(
                                announced.contains(&oid),
                                "oid {oid} used before its announcement"
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_announcements_precede_use_on_the_wire() {
    with_pair(|pair| async move {
        let echo_target: Rc<dyn Remotable> = MyObject::new("w");
        let oid = pair.a.add_stub(&echo_target).expect("add stub");

        // Two calls carrying fresh objects, one reusing an earlier object.
        let first: Rc<dyn Remotable> = MyObject::new("1");
        let second: Rc<dyn Remotable> = MyObject::new("2");
        let _ = pair
            .b
            .call(
                &oid,
                "frobnicate",
                vec![
                    RpcValue::from("x"),
                    RpcValue::List(vec![
                        RpcValue::Object(Rc::clone(&first)),
                        RpcValue::Object(Rc::clone(&second)),
                    ]),
                ],
            )
            .expect("dispatch")
            .await;
        let _ = pair
            .b
            .call(
                &oid,
                "frobnicate",
                vec![RpcValue::from("x"), RpcValue::Object(Rc::clone(&first))],
            )
            .expect("dispatch")
            .await;
        settle().await;

        assert_announce_before_use(&pair.b_writes.borrow());
        assert_announce_before_use(&pair.a_writes.borrow());
    })
    .await;
}

#[tokio::test]
async fn test_reexport_reannounces_on_the_wire() {
    with_pair(|pair| async move {
        let target: Rc<dyn Remotable> = MyObject::new("x");

        let oid = pair.a.add_stub(&target).expect("add stub");
        let again = pair.a.add_stub(&target).expect("add stub again");
        assert_eq!(oid, again);

        pair.a.free_handle(&oid).free();
        let reexported = pair.a.add_stub(&target).expect("re-export");
        assert_eq!(reexported, oid);
        settle().await;

        let announcements: Vec<String> = pair
            .a_writes
            .borrow()
            .iter()
            .filter(|frame| frame.get("control").and_then(Value::as_str) == Some("new-object"))
            .filter_map(|frame| frame.get("obj").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        // One announcement per installation: the original and the re-export.
        assert_eq!(
            announcements,
            vec![oid.as_str().to_string(), oid.as_str().to_string()]
        );
    })
    .await;
}

#[tokio::test]
async fn test_pending_calls_reject_exactly_once_on_closure() {
    with_pair(|pair| async move {
        // A stub exists but its socket is torn down before it can reply:
        // destroy the caller side while the call is in flight.
        let target: Rc<dyn Remotable> = MyObject::new("x");
        let oid = pair.a.add_stub(&target).expect("add stub");

        let in_flight = pair
            .b
            .call(&oid, "frobnicate", vec![RpcValue::from("x")])
            .expect("dispatch");
        pair.b.destroy();

        assert_eq!(in_flight.await, Err(RpcError::SocketClosed));
        assert!(pair.b.is_closed());

        // New calls fail without touching the transport.
        assert_eq!(
            pair.b
                .call(&oid, "frobnicate", Vec::new())
                .expect_err("must fail"),
            RpcError::SocketClosed
        );
    })
    .await;
}

#[tokio::test]
async fn test_peer_end_rejects_pending_calls() {
    with_pair(|pair| async move {
        // A call to an oid the peer never answers for, because the peer ends
        // first.
        let in_flight = pair
            .b
            .call(&Oid::new("peer-a-unknown"), "m", Vec::new())
            .expect("dispatch");

        pair.a.end();
        settle().await;

        // The peer's end reaches b's driver, which closes the endpoint.
        assert_eq!(in_flight.await, Err(RpcError::SocketClosed));
        assert!(pair.b.is_closed());
    })
    .await;
}

/// An object whose method snapshot tries to start a call mid-marshal.
struct EvilSnapshot {
    socket: Socket,
    observed: Rc<Cell<Option<bool>>>,
}

#[async_trait(?Send)]
impl Remotable for EvilSnapshot {
    fn exposed_methods(&self) -> Vec<String> {
        let outcome = self.socket.call(&Oid::new("anyone"), "anything", Vec::new());
        self.observed
            .set(Some(matches!(outcome, Err(RpcError::ReentrantCall))));
        vec!["noop".to_string()]
    }

    async fn call(&self, _method: &str, _args: Vec<RpcValue>) -> Result<RpcValue, MethodError> {
        Ok(RpcValue::Null)
    }
}

#[tokio::test]
async fn test_nested_call_during_marshalling_is_rejected() {
    with_pair(|pair| async move {
        let observed = Rc::new(Cell::new(None));
        let evil: Rc<dyn Remotable> = Rc::new(EvilSnapshot {
            socket: pair.b.clone(),
            observed: Rc::clone(&observed),
        });

        // Marshalling the argument snapshots the object's methods, which
        // attempts a nested outbound call.
        let _ = pair
            .b
            .call(
                &Oid::new("peer-a-unknown"),
                "deliver",
                vec![RpcValue::Object(evil)],
            )
            .expect("outer dispatch");

        assert_eq!(observed.get(), Some(true));
    })
    .await;
}

#[test]
fn test_free_handle_works_without_the_socket() {
    let ((transport, _inbound), _peer_side) = tether::pipe();
    let socket = Socket::new(Box::new(transport));

    let target: Rc<dyn Remotable> = MyObject::new("x");
    let oid = socket.add_stub(&target).expect("add stub");
    let handle = socket.free_handle(&oid);

    // The handle holds the id map, not the socket: it keeps working after
    // the socket itself is gone.
    drop(socket);
    handle.free();
}

#[tokio::test]
async fn test_stub_survives_free_and_object_lives_on() {
    with_pair(|pair| async move {
        let flag = Rc::new(RefCell::new(String::from("alive")));
        struct Probe {
            flag: Rc<RefCell<String>>,
        }

        #[async_trait(?Send)]
        impl Remotable for Probe {
            fn exposed_methods(&self) -> Vec<String> {
                vec!["read".to_string()]
            }

            async fn call(
                &self,
                _method: &str,
                _args: Vec<RpcValue>,
            ) -> Result<RpcValue, MethodError> {
                Ok(RpcValue::from(self.flag.borrow().as_str()))
            }
        }

        let probe: Rc<dyn Remotable> = Rc::new(Probe {
            flag: Rc::clone(&flag),
        });
        let oid = pair.a.add_stub(&probe).expect("add stub");

        pair.a.free_handle(&oid).free();

        // Freeing removed the stub: calls fail with invalid-object.
        let err = pair
            .b
            .call(&oid, "read", Vec::new())
            .expect("dispatch")
            .await
            .expect_err("stub must be gone");
        match err {
            RpcError::Remote(remote) => {
                assert_eq!(remote.code.as_deref(), Some(tether::ERR_INVALID_OBJECT));
            }
            other => panic!("expected remote invalid-object, got {other:?}"),
        }

        // The object itself lives on untouched.
        assert_eq!(&*flag.borrow(), "alive");
    })
    .await;
}
