//! Classification and handling of inbound frames.
//!
//! The router is a state machine on the `control` discriminant: announcements
//! feed the proxy registry, calls dispatch to the stub registry, replies
//! settle the pending-call table, and free notices release whichever registry
//! holds the oid. Malformed frames never crash the endpoint: when the frame
//! carries enough to answer, a diagnostic error reply is written; otherwise
//! the frame is logged and dropped.

use std::rc::Rc;

use serde_json::Value;
use tether_core::Oid;
use tether_core::frame::{Frame, FrameError};

use crate::error::{ErrorClass, MethodError, RemoteError, ReplyErrorParts, RpcError};
use crate::marshal::{marshal, unmarshal};
use crate::remotable::{MethodKind, authorised, classify};
use crate::socket::SocketShared;
use crate::stub::StubEntry;
use crate::value::RpcValue;

/// Route one inbound frame to its handler.
pub(crate) fn route(shared: &Rc<SocketShared>, raw: Value) {
    match Frame::from_value(&raw) {
        Ok(Frame::NewObject { obj, methods }) => handle_new_object(shared, obj, methods),
        Ok(Frame::Call {
            id,
            obj,
            method,
            params,
        }) => handle_call(shared, id, obj, method, params),
        Ok(Frame::Reply {
            id,
            reply,
            error,
            message,
            stack,
            code,
        }) => handle_reply(shared, id, reply, error, message, stack, code),
        Ok(Frame::Free { id }) => handle_free(shared, id),
        Err(err) => handle_unroutable(shared, &raw, err),
    }
}

/// An announcement for an unknown oid constructs a proxy; a known oid is
/// ignored, keeping proxy identity stable across repeated arrivals.
fn handle_new_object(shared: &Rc<SocketShared>, obj: Oid, methods: Vec<String>) {
    shared
        .proxies
        .insert_if_unknown(obj, methods, Rc::downgrade(shared));
}

fn handle_call(shared: &Rc<SocketShared>, id: u64, obj: Oid, method: String, params: Vec<Value>) {
    let Some(entry) = shared.stubs.lookup(&obj) else {
        write_error_reply(
            shared,
            id,
            ReplyErrorParts::from(&RpcError::InvalidObject { oid: obj }),
        );
        return;
    };
    if !authorised(&entry.methods, &method) {
        write_error_reply(
            shared,
            id,
            ReplyErrorParts::from(&RpcError::InvalidMethod { method }),
        );
        return;
    }
    match classify(&method) {
        MethodKind::Get(_) if !params.is_empty() => {
            write_error_reply(
                shared,
                id,
                ReplyErrorParts::from(&RpcError::WrongArity {
                    method: method.clone(),
                    expected: 0,
                    actual: params.len(),
                }),
            );
            return;
        }
        MethodKind::Set(_) if params.len() != 1 => {
            write_error_reply(
                shared,
                id,
                ReplyErrorParts::from(&RpcError::WrongArity {
                    method: method.clone(),
                    expected: 1,
                    actual: params.len(),
                }),
            );
            return;
        }
        _ => {}
    }

    // Execution is spawned so a stubbed method may itself await calls back
    // to the caller while later frames keep flowing.
    let task_shared = Rc::clone(shared);
    shared.spawn(
        "inbound-call",
        Box::pin(async move {
            let outcome = execute(&task_shared, &entry, &method, params).await;
            // Stubs discovered while marshalling the reply are announced
            // before the reply frame that references them.
            task_shared.flush_announcements();
            match outcome {
                Ok(value) => {
                    let frame = Frame::Reply {
                        id,
                        reply: Some(value),
                        error: None,
                        message: None,
                        stack: None,
                        code: None,
                    };
                    if let Err(err) = task_shared.write_frame(frame) {
                        tracing::trace!(id, error = %err, "reply discarded");
                    }
                }
                Err(parts) => write_error_reply(&task_shared, id, parts),
            }
        }),
    );
}

/// Run the target method and marshal its result.
async fn execute(
    shared: &Rc<SocketShared>,
    entry: &StubEntry,
    method: &str,
    params: Vec<Value>,
) -> Result<Value, ReplyErrorParts> {
    let mut args = Vec::with_capacity(params.len());
    for param in &params {
        let arg = unmarshal(&shared.stubs, &shared.proxies, param)
            .map_err(|err| ReplyErrorParts::from(&err))?;
        args.push(arg);
    }

    let outcome = match classify(method) {
        MethodKind::Get(property) => entry.target.get(property).await,
        MethodKind::Set(property) => match args.pop() {
            Some(value) => entry
                .target
                .set(property, value)
                .await
                .map(|()| RpcValue::Null),
            None => Err(MethodError::type_error("missing argument")),
        },
        MethodKind::Call(name) => entry.target.call(name, args).await,
    };

    let value = outcome.map_err(ReplyErrorParts::from)?;
    marshal(
        &shared.stubs,
        &shared.proxies,
        &value,
        &shared.announce_buffer,
    )
    .map_err(|err| ReplyErrorParts::from(&err))
}

#[allow(clippy::too_many_arguments)]
fn handle_reply(
    shared: &Rc<SocketShared>,
    id: u64,
    reply: Option<Value>,
    error: Option<String>,
    message: Option<String>,
    stack: Option<String>,
    code: Option<String>,
) {
    let result = match error {
        Some(class) => Err(RpcError::Remote(RemoteError {
            class: ErrorClass::from_wire(&class),
            message: message.unwrap_or_default(),
            stack,
            code,
        })),
        None => match reply {
            Some(value) => unmarshal(&shared.stubs, &shared.proxies, &value),
            // A reply with neither field is a successful reply of undefined.
            None => Ok(RpcValue::Null),
        },
    };
    if !shared.pending.settle(id, result) {
        tracing::warn!(id, "reply for unknown call id");
    }
}

/// Remove the oid from whichever registry holds it; an oid in neither is
/// silently ignored.
fn handle_free(shared: &Rc<SocketShared>, oid: Oid) {
    if shared.stubs.remove(&oid) {
        tracing::debug!(oid = %oid, "stub freed by peer");
    } else if shared.proxies.remove(&oid).is_some() {
        tracing::debug!(oid = %oid, "proxy released by peer notice");
    }
}

fn handle_unroutable(shared: &Rc<SocketShared>, raw: &Value, err: FrameError) {
    match raw.get("control").and_then(Value::as_str) {
        // A malformed call that still carries an id can be answered.
        Some("call") => match raw.get("id").and_then(Value::as_u64) {
            Some(id) => {
                tracing::warn!(id, error = %err, "malformed call frame");
                write_error_reply(
                    shared,
                    id,
                    ReplyErrorParts::from(&RpcError::MalformedFrame {
                        reason: err.to_string(),
                    }),
                );
            }
            None => tracing::warn!(error = %err, "dropping malformed call frame without id"),
        },
        Some("new-object") | Some("reply") | Some("free") => {
            tracing::warn!(error = %err, "dropping malformed frame");
        }
        Some(control) => tracing::trace!(control, "ignoring unknown control"),
        None => tracing::warn!("dropping frame without control discriminant"),
    }
}

fn write_error_reply(shared: &SocketShared, id: u64, parts: ReplyErrorParts) {
    tracing::debug!(id, class = %parts.error, message = %parts.message, "call rejected");
    let frame = Frame::Reply {
        id,
        reply: None,
        error: Some(parts.error),
        message: Some(parts.message),
        stack: parts.stack,
        code: parts.code,
    };
    if let Err(err) = shared.write_frame(frame) {
        tracing::trace!(id, error = %err, "error reply discarded");
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use async_trait::async_trait;
    use serde_json::json;
    use tether_core::pipe;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::error::ERR_INVALID_OBJECT;
    use crate::remotable::Remotable;
    use crate::socket::{Socket, SocketConfig};
    use crate::value::RpcValue;
    use crate::{Frame, MethodError, Oid};

    struct Widget;

    #[async_trait(?Send)]
    impl Remotable for Widget {
        fn exposed_methods(&self) -> Vec<String> {
            vec!["poke".to_string(), "get value".to_string()]
        }

        async fn call(&self, _method: &str, _args: Vec<RpcValue>) -> Result<RpcValue, MethodError> {
            Ok(RpcValue::Null)
        }
    }

    fn socket_with_peer_rx() -> (Socket, UnboundedReceiver<serde_json::Value>) {
        let ((transport, _inbound), (_peer_transport, peer_rx)) = pipe();
        let socket = Socket::with_config(
            Box::new(transport),
            SocketConfig::with_host_label("test"),
        );
        (socket, peer_rx)
    }

    fn error_reply(rx: &mut UnboundedReceiver<serde_json::Value>) -> (u64, String, Option<String>) {
        let value = rx.try_recv().expect("reply frame");
        match Frame::from_value(&value).expect("frame") {
            Frame::Reply {
                id, error, code, ..
            } => (id, error.expect("error field"), code),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_call_to_unknown_oid_replies_enxio() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({
            "control": "call", "id": 5, "obj": "nobody", "method": "m", "params": []
        }));

        let (id, class, code) = error_reply(&mut peer_rx);
        assert_eq!(id, 5);
        assert_eq!(class, "Error");
        assert_eq!(code.as_deref(), Some(ERR_INVALID_OBJECT));
    }

    #[test]
    fn test_call_to_unknown_method_replies_type_error() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        let widget: Rc<dyn Remotable> = Rc::new(Widget);
        let oid = socket.add_stub(&widget).expect("add stub");
        let _announcement = peer_rx.try_recv().expect("announcement");

        socket.handle_message(json!({
            "control": "call", "id": 6, "obj": oid, "method": "missing", "params": []
        }));

        let (id, class, _code) = error_reply(&mut peer_rx);
        assert_eq!(id, 6);
        assert_eq!(class, "TypeError");
    }

    #[test]
    fn test_getter_with_arguments_replies_wrong_arity() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        let widget: Rc<dyn Remotable> = Rc::new(Widget);
        let oid = socket.add_stub(&widget).expect("add stub");
        let _announcement = peer_rx.try_recv().expect("announcement");

        socket.handle_message(json!({
            "control": "call", "id": 7, "obj": oid, "method": "get value", "params": [1]
        }));

        let (id, class, _code) = error_reply(&mut peer_rx);
        assert_eq!(id, 7);
        assert_eq!(class, "TypeError");
    }

    #[test]
    fn test_setter_requires_exactly_one_argument() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        let widget: Rc<dyn Remotable> = Rc::new(Widget);
        let oid = socket.add_stub(&widget).expect("add stub");
        let _announcement = peer_rx.try_recv().expect("announcement");

        socket.handle_message(json!({
            "control": "call", "id": 8, "obj": oid, "method": "set value", "params": []
        }));

        let (id, class, _code) = error_reply(&mut peer_rx);
        assert_eq!(id, 8);
        assert_eq!(class, "TypeError");
    }

    #[test]
    fn test_malformed_call_with_id_gets_diagnostic_reply() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({
            "control": "call", "id": 9, "obj": "x", "method": "m", "params": "not-an-array"
        }));

        let (id, class, _code) = error_reply(&mut peer_rx);
        assert_eq!(id, 9);
        assert_eq!(class, "TypeError");
    }

    #[test]
    fn test_malformed_call_without_id_is_dropped() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({ "control": "call", "method": "m" }));
        assert!(peer_rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_control_is_ignored() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({ "control": "gossip", "payload": 1 }));
        socket.handle_message(json!(42));
        assert!(peer_rx.try_recv().is_err());
    }

    #[test]
    fn test_reply_for_unknown_id_is_dropped() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({ "control": "reply", "id": 404, "reply": 1 }));
        assert!(peer_rx.try_recv().is_err());
    }

    #[test]
    fn test_repeated_announcement_keeps_first_proxy() {
        let (socket, _peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({
            "control": "new-object", "obj": "peer-1:0:1", "methods": ["m"]
        }));
        let first = socket.get_proxy(&Oid::new("peer-1:0:1")).expect("proxy");

        socket.handle_message(json!({
            "control": "new-object", "obj": "peer-1:0:1", "methods": ["m", "extra"]
        }));
        let second = socket.get_proxy(&Oid::new("peer-1:0:1")).expect("proxy");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.methods(), ["m"]);
    }

    #[test]
    fn test_free_removes_stub_silently() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        let widget: Rc<dyn Remotable> = Rc::new(Widget);
        let oid = socket.add_stub(&widget).expect("add stub");
        let _announcement = peer_rx.try_recv().expect("announcement");

        socket.handle_message(json!({ "control": "free", "id": oid }));

        // The stub is gone: a call now reports an invalid object.
        socket.handle_message(json!({
            "control": "call", "id": 10, "obj": oid, "method": "poke", "params": []
        }));
        let (_id, _class, code) = error_reply(&mut peer_rx);
        assert_eq!(code.as_deref(), Some(ERR_INVALID_OBJECT));
    }

    #[test]
    fn test_free_for_unknown_oid_is_silent() {
        let (socket, mut peer_rx) = socket_with_peer_rx();
        socket.handle_message(json!({ "control": "free", "id": "nobody" }));
        assert!(peer_rx.try_recv().is_err());
    }
}
