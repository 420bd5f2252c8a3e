//! Wire frames and the `{oid}` argument marker.
//!
//! Every message exchanged between endpoints is a structured record with a
//! `control` discriminant. The four controls are:
//!
//! | `control` | Payload | Direction |
//! |-----------|---------|-----------|
//! | `new-object` | `obj`, `methods` | either |
//! | `call` | `id`, `obj`, `method`, `params` | request |
//! | `reply` | `id`, then `reply` or `error` (+ `message`, `stack`, `code`) | response |
//! | `free` | `id` (an oid) | either |
//!
//! An object reference inside `params` or `reply` is encoded as a record of
//! exactly the shape `{"oid": "..."}`; see [`oid_marker`] / [`as_oid_marker`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::oid::Oid;

/// A control frame as it appears on the wire.
///
/// Parsing tolerates extra fields; a frame that does not match any variant
/// is reported as a [`FrameError`] and left to the router's fallback
/// handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "kebab-case")]
pub enum Frame {
    /// Announces a newly reachable stub to the peer.
    NewObject {
        /// Identifier of the announced stub.
        obj: Oid,
        /// Method snapshot: plain names and `get NAME` entries.
        methods: Vec<String>,
    },
    /// Invokes a method on one of the peer's stubs.
    Call {
        /// Caller-allocated correlation id.
        id: u64,
        /// Target stub.
        obj: Oid,
        /// Method name, `get NAME`, or `set NAME`.
        method: String,
        /// Marshalled arguments.
        params: Vec<Value>,
    },
    /// Settles the call identified by `id`.
    ///
    /// Exactly one of `reply` and `error` is normally present; a frame with
    /// neither is a successful reply of undefined value.
    Reply {
        /// Correlation id of the settled call.
        id: u64,
        /// Marshalled return value, when the call succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply: Option<Value>,
        /// Error class name (`SyntaxError`, `TypeError`, or `Error`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Human-readable error message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Stack trace captured where the error was thrown.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        /// Machine-readable error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Releases the peer's stub named by `id`.
    Free {
        /// Identifier of the released stub.
        id: Oid,
    },
}

impl Frame {
    /// Parse a structured record into a frame.
    pub fn from_value(value: &Value) -> Result<Self, FrameError> {
        serde_json::from_value(value.clone()).map_err(|e| FrameError(e.to_string()))
    }

    /// Render the frame as the structured record written to the transport.
    pub fn into_value(self) -> Value {
        match self {
            Frame::NewObject { obj, methods } => {
                json!({ "control": "new-object", "obj": obj, "methods": methods })
            }
            Frame::Call {
                id,
                obj,
                method,
                params,
            } => {
                json!({ "control": "call", "id": id, "obj": obj, "method": method, "params": params })
            }
            Frame::Reply {
                id,
                reply,
                error,
                message,
                stack,
                code,
            } => {
                let mut map = Map::new();
                map.insert("control".to_string(), json!("reply"));
                map.insert("id".to_string(), json!(id));
                if let Some(value) = reply {
                    map.insert("reply".to_string(), value);
                }
                if let Some(class) = error {
                    map.insert("error".to_string(), Value::String(class));
                }
                if let Some(text) = message {
                    map.insert("message".to_string(), Value::String(text));
                }
                if let Some(trace) = stack {
                    map.insert("stack".to_string(), Value::String(trace));
                }
                if let Some(tag) = code {
                    map.insert("code".to_string(), Value::String(tag));
                }
                Value::Object(map)
            }
            Frame::Free { id } => json!({ "control": "free", "id": id }),
        }
    }
}

/// A record that could not be parsed as any known frame.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unroutable frame: {0}")]
pub struct FrameError(String);

/// Wire form of an object reference: `{"oid": "..."}`.
pub fn oid_marker(oid: &Oid) -> Value {
    json!({ "oid": oid })
}

/// Match a value of exactly the marker shape.
///
/// Only a record with the single key `oid` holding a string qualifies;
/// anything structurally richer is ordinary data.
pub fn as_oid_marker(value: &Value) -> Option<Oid> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get("oid")?.as_str().map(Oid::new)
}
