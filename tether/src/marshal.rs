//! Structural rewrite of value trees crossing the wire.
//!
//! Marshalling rewrites an [`RpcValue`] tree into the structured record the
//! transport carries; unmarshalling mirrors it. The shape is preserved:
//! lists map to arrays, records to records. Live objects leave as `{oid}`
//! markers, and markers resolve back: first against the stub map (the
//! owning side recovers its original object), then against the proxy map.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};
use tether_core::frame::{as_oid_marker, oid_marker};
use tether_core::Oid;

use crate::error::RpcError;
use crate::proxy::ProxyRegistry;
use crate::stub::StubRegistry;
use crate::value::RpcValue;

/// A `new-object` announcement produced during marshalling.
///
/// Announcements are buffered by the caller and flushed to the wire before
/// the frame whose payload references them, so the peer always sees a stub
/// before the first use of its oid.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Announcement {
    pub oid: Oid,
    pub methods: Vec<String>,
}

/// Rewrite one outbound value into wire form.
///
/// Stubs discovered on the way (objects not yet exported) are registered
/// immediately; their announcements are appended to `announcements` rather
/// than written, preserving the wire-ordering invariant.
pub(crate) fn marshal(
    stubs: &StubRegistry,
    proxies: &ProxyRegistry,
    value: &RpcValue,
    announcements: &RefCell<Vec<Announcement>>,
) -> Result<Value, RpcError> {
    match value {
        RpcValue::Null => Ok(Value::Null),
        RpcValue::Bool(b) => Ok(Value::Bool(*b)),
        RpcValue::Number(n) => Ok(Value::Number(n.clone())),
        RpcValue::Text(s) => Ok(Value::String(s.clone())),
        RpcValue::List(items) => items
            .iter()
            .map(|item| marshal(stubs, proxies, item, announcements))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        RpcValue::Record(fields) => {
            let mut map = Map::new();
            for (key, field) in fields {
                map.insert(key.clone(), marshal(stubs, proxies, field, announcements)?);
            }
            Ok(Value::Object(map))
        }
        RpcValue::Proxy(proxy) => match proxies.get(proxy.oid()) {
            // A proxy for one of the peer's stubs round-trips to its owner.
            Some(known) if Rc::ptr_eq(&known, proxy) => Ok(oid_marker(proxy.oid())),
            // A proxy from a different endpoint cannot be forwarded.
            _ => Err(RpcError::InvalidObject {
                oid: proxy.oid().clone(),
            }),
        },
        RpcValue::Object(target) => {
            let registered = stubs.add_stub(target)?;
            if let Some(methods) = registered.announce {
                announcements.borrow_mut().push(Announcement {
                    oid: registered.oid.clone(),
                    methods,
                });
            }
            Ok(oid_marker(&registered.oid))
        }
    }
}

/// Resolve one inbound value from wire form.
pub(crate) fn unmarshal(
    stubs: &StubRegistry,
    proxies: &ProxyRegistry,
    value: &Value,
) -> Result<RpcValue, RpcError> {
    match value {
        Value::Null => Ok(RpcValue::Null),
        Value::Bool(b) => Ok(RpcValue::Bool(*b)),
        Value::Number(n) => Ok(RpcValue::Number(n.clone())),
        Value::String(s) => Ok(RpcValue::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| unmarshal(stubs, proxies, item))
            .collect::<Result<Vec<_>, _>>()
            .map(RpcValue::List),
        Value::Object(map) => {
            if let Some(oid) = as_oid_marker(value) {
                if let Some(entry) = stubs.lookup(&oid) {
                    return Ok(RpcValue::Object(entry.target));
                }
                if let Some(proxy) = proxies.get(&oid) {
                    return Ok(RpcValue::Proxy(proxy));
                }
                return Err(RpcError::InvalidObject { oid });
            }
            let mut fields = std::collections::BTreeMap::new();
            for (key, field) in map {
                fields.insert(key.clone(), unmarshal(stubs, proxies, field)?);
            }
            Ok(RpcValue::Record(fields))
        }
    }
}
