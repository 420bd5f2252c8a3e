//! Values crossing the RPC boundary.
//!
//! [`RpcValue`] is the argument and return currency of the engine: JSON-shaped
//! data plus live objects. `Object` holds a locally owned stubbable target;
//! `Proxy` holds a handle to an object owned by the peer. The marshaller
//! rewrites both into `{oid}` markers on the way out and restores them on the
//! way in.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Number, Value};

use crate::proxy::Proxy;
use crate::remotable::Remotable;

/// A value that can cross the RPC boundary.
///
/// Equality is structural for data and pointer identity for `Object` and
/// `Proxy`, matching the round-trip guarantee: a stubbable object returns to
/// its owner as the same `Rc`, and a proxy returns as the same instance.
#[derive(Clone)]
pub enum RpcValue {
    /// Absent / undefined / null.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer or float.
    Number(Number),
    /// A string.
    Text(String),
    /// An ordered list, marshalled element-wise.
    List(Vec<RpcValue>),
    /// A plain record, marshalled field-wise.
    Record(BTreeMap<String, RpcValue>),
    /// A locally owned stubbable object.
    Object(Rc<dyn Remotable>),
    /// A handle to an object owned by the peer.
    Proxy(Rc<Proxy>),
}

impl RpcValue {
    /// True for [`RpcValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, RpcValue::Null)
    }

    /// The string slice, when this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value, when this is a number representable as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RpcValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// The float value, when this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RpcValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// The boolean, when this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RpcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The elements, when this is a list.
    pub fn as_list(&self) -> Option<&[RpcValue]> {
        match self {
            RpcValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// The fields, when this is a record.
    pub fn as_record(&self) -> Option<&BTreeMap<String, RpcValue>> {
        match self {
            RpcValue::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// The target, when this is a locally owned object.
    pub fn as_object(&self) -> Option<&Rc<dyn Remotable>> {
        match self {
            RpcValue::Object(target) => Some(target),
            _ => None,
        }
    }

    /// The proxy, when this is a remote handle.
    pub fn as_proxy(&self) -> Option<&Rc<Proxy>> {
        match self {
            RpcValue::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Render as plain JSON.
    ///
    /// Returns `None` when the tree holds live objects or proxies; those
    /// only serialize through the marshaller, which knows the registries.
    pub fn to_plain_json(&self) -> Option<Value> {
        match self {
            RpcValue::Null => Some(Value::Null),
            RpcValue::Bool(b) => Some(Value::Bool(*b)),
            RpcValue::Number(n) => Some(Value::Number(n.clone())),
            RpcValue::Text(s) => Some(Value::String(s.clone())),
            RpcValue::List(items) => items
                .iter()
                .map(RpcValue::to_plain_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            RpcValue::Record(fields) => {
                let mut map = serde_json::Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_plain_json()?);
                }
                Some(Value::Object(map))
            }
            RpcValue::Object(_) | RpcValue::Proxy(_) => None,
        }
    }
}

impl PartialEq for RpcValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RpcValue::Null, RpcValue::Null) => true,
            (RpcValue::Bool(a), RpcValue::Bool(b)) => a == b,
            (RpcValue::Number(a), RpcValue::Number(b)) => a == b,
            (RpcValue::Text(a), RpcValue::Text(b)) => a == b,
            (RpcValue::List(a), RpcValue::List(b)) => a == b,
            (RpcValue::Record(a), RpcValue::Record(b)) => a == b,
            (RpcValue::Object(a), RpcValue::Object(b)) => Rc::ptr_eq(a, b),
            (RpcValue::Proxy(a), RpcValue::Proxy(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for RpcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcValue::Null => f.write_str("Null"),
            RpcValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            RpcValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            RpcValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            RpcValue::List(items) => f.debug_tuple("List").field(items).finish(),
            RpcValue::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            RpcValue::Object(_) => f.write_str("Object(..)"),
            RpcValue::Proxy(proxy) => write!(f, "Proxy({})", proxy.oid()),
        }
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        RpcValue::Bool(value)
    }
}

impl From<i64> for RpcValue {
    fn from(value: i64) -> Self {
        RpcValue::Number(Number::from(value))
    }
}

impl From<u64> for RpcValue {
    fn from(value: u64) -> Self {
        RpcValue::Number(Number::from(value))
    }
}

impl From<f64> for RpcValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(RpcValue::Null, RpcValue::Number)
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        RpcValue::Text(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        RpcValue::Text(value)
    }
}

impl From<Vec<RpcValue>> for RpcValue {
    fn from(items: Vec<RpcValue>) -> Self {
        RpcValue::List(items)
    }
}

impl From<Value> for RpcValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RpcValue::Null,
            Value::Bool(b) => RpcValue::Bool(b),
            Value::Number(n) => RpcValue::Number(n),
            Value::String(s) => RpcValue::Text(s),
            Value::Array(items) => RpcValue::List(items.into_iter().map(RpcValue::from).collect()),
            Value::Object(map) => RpcValue::Record(
                map.into_iter()
                    .map(|(key, value)| (key, RpcValue::from(value)))
                    .collect(),
            ),
        }
    }
}
