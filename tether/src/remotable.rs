//! The contract application objects implement to be stubbable.
//!
//! A [`Remotable`] enumerates its publicly callable entries and executes
//! them. Entries are either plain method names or the form `get NAME`,
//! which exposes the property `NAME` for both reading and writing. A
//! property is either fully exposed or not at all.

use async_trait::async_trait;

use crate::error::MethodError;
use crate::value::RpcValue;

/// An application object that can be exported to the peer.
///
/// The method snapshot is taken once when the stub is created; renaming or
/// removing entries afterwards has no effect on an existing stub.
#[async_trait(?Send)]
pub trait Remotable {
    /// The entries exposed to the peer: plain method names and `get NAME`
    /// property declarations. An empty list makes the object unstubbable.
    fn exposed_methods(&self) -> Vec<String>;

    /// Invoke a plain method with the caller's arguments.
    async fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<RpcValue, MethodError>;

    /// Read a property declared as `get NAME`.
    async fn get(&self, property: &str) -> Result<RpcValue, MethodError> {
        Err(MethodError::type_error(format!(
            "no readable property `{property}`"
        )))
    }

    /// Write a property; authorised by the same `get NAME` declaration.
    async fn set(&self, property: &str, _value: RpcValue) -> Result<(), MethodError> {
        Err(MethodError::type_error(format!(
            "no writable property `{property}`"
        )))
    }
}

/// How a wire method name dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MethodKind<'a> {
    /// A plain method invocation.
    Call(&'a str),
    /// A property read (`get NAME`, zero arguments).
    Get(&'a str),
    /// A property write (`set NAME`, exactly one argument).
    Set(&'a str),
}

pub(crate) fn classify(method: &str) -> MethodKind<'_> {
    if let Some(property) = method.strip_prefix("get ") {
        MethodKind::Get(property)
    } else if let Some(property) = method.strip_prefix("set ") {
        MethodKind::Set(property)
    } else {
        MethodKind::Call(method)
    }
}

/// Whether the snapshot authorises `method`.
///
/// A `set NAME` is authorised by the `get NAME` entry; there is no separate
/// setter declaration.
pub(crate) fn authorised(snapshot: &[String], method: &str) -> bool {
    match classify(method) {
        MethodKind::Call(name) => snapshot.iter().any(|entry| entry == name),
        MethodKind::Get(property) | MethodKind::Set(property) => snapshot
            .iter()
            .any(|entry| entry.strip_prefix("get ") == Some(property)),
    }
}
