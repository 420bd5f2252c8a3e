//! Error types for the RPC engine.
//!
//! Three layers of failure exist:
//!
//! - [`MethodError`]: raised by application method implementations; its
//!   class, message, stack, and code cross the wire intact.
//! - [`RemoteError`]: a [`MethodError`] (or engine-side rejection) as seen
//!   by the caller after crossing the wire.
//! - [`RpcError`]: everything a socket operation can surface, including
//!   local failures that never touch the transport.

use serde::{Deserialize, Serialize};
use tether_core::{Oid, TransportError};

/// Wire code carried by closed-endpoint errors.
pub const ERR_SOCKET_CLOSED: &str = "ERR_SOCKET_CLOSED";

/// Wire code carried by invalid-object errors.
pub const ERR_INVALID_OBJECT: &str = "ENXIO";

/// Classification of a thrown error as it crosses the wire.
///
/// Only these three classes survive the trip; anything else degrades to
/// [`ErrorClass::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// A syntax error (for example a failed parse inside the method).
    Syntax,
    /// A type error (bad method, bad arity, bad argument shape).
    Type,
    /// Any other error.
    Generic,
}

impl ErrorClass {
    /// The class name written into the reply frame's `error` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            ErrorClass::Syntax => "SyntaxError",
            ErrorClass::Type => "TypeError",
            ErrorClass::Generic => "Error",
        }
    }

    /// Classify an incoming `error` field.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "SyntaxError" => ErrorClass::Syntax,
            "TypeError" => ErrorClass::Type,
            _ => ErrorClass::Generic,
        }
    }
}

/// Failure raised by an application method implementation.
///
/// The stub side captures these, writes them into the reply frame, and stays
/// healthy; the caller observes them as [`RemoteError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct MethodError {
    /// Class preserved across the wire.
    pub class: ErrorClass,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable code (for example `E_FOO_BAR_ERROR`).
    pub code: Option<String>,
    /// Optional stack trace captured where the error was raised.
    pub stack: Option<String>,
}

impl MethodError {
    /// A generic error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Generic,
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    /// A type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Type,
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    /// A syntax error.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Syntax,
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    /// Attach a machine-readable code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(err: serde_json::Error) -> Self {
        MethodError::syntax_error(err.to_string())
    }
}

/// An error thrown on the far side, as observed by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    /// Preserved class of the remote error.
    pub class: ErrorClass,
    /// Preserved message.
    pub message: String,
    /// Preserved stack trace, when the far side supplied one.
    pub stack: Option<String>,
    /// Preserved machine-readable code.
    pub code: Option<String>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class.wire_name(), self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Errors surfaced by socket operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// The endpoint is closed; the transport was not touched.
    #[error("socket closed")]
    SocketClosed,

    /// An oid that neither registry can resolve, or a proxy belonging to a
    /// different endpoint.
    #[error("invalid object: {oid}")]
    InvalidObject {
        /// The offending identifier.
        oid: Oid,
    },

    /// A method name absent from the stub's snapshot, or an undeclared
    /// method on a proxy.
    #[error("invalid method: {method}")]
    InvalidMethod {
        /// The rejected method name.
        method: String,
    },

    /// A getter or setter invoked with the wrong number of arguments.
    #[error("{method} takes {expected} argument(s), got {actual}")]
    WrongArity {
        /// The rejected method name.
        method: String,
        /// Arguments the method accepts.
        expected: usize,
        /// Arguments the call supplied.
        actual: usize,
    },

    /// An outbound call started while another call was marshalling.
    #[error("call started while another call is marshalling")]
    ReentrantCall,

    /// The object exposes no callable methods and cannot be stubbed.
    #[error("object exposes no callable methods")]
    NotStubbable,

    /// A frame that could not be interpreted.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// What failed to parse or validate.
        reason: String,
    },

    /// An error thrown by the far side's method.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RpcError {
    /// Machine-readable code for this error, when one is defined.
    pub fn code(&self) -> Option<&str> {
        match self {
            RpcError::SocketClosed => Some(ERR_SOCKET_CLOSED),
            RpcError::InvalidObject { .. } => Some(ERR_INVALID_OBJECT),
            RpcError::Remote(remote) => remote.code.as_deref(),
            _ => None,
        }
    }
}

/// The error half of a reply frame, ready to serialize.
///
/// Both application failures ([`MethodError`]) and engine-side rejections
/// ([`RpcError`]) reduce to this shape before being written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReplyErrorParts {
    pub error: String,
    pub message: String,
    pub stack: Option<String>,
    pub code: Option<String>,
}

impl From<MethodError> for ReplyErrorParts {
    fn from(err: MethodError) -> Self {
        Self {
            error: err.class.wire_name().to_string(),
            message: err.message,
            stack: err.stack,
            code: err.code,
        }
    }
}

impl From<&RpcError> for ReplyErrorParts {
    fn from(err: &RpcError) -> Self {
        let class = match err {
            RpcError::Remote(remote) => remote.class,
            RpcError::InvalidMethod { .. }
            | RpcError::WrongArity { .. }
            | RpcError::MalformedFrame { .. }
            | RpcError::NotStubbable
            | RpcError::ReentrantCall => ErrorClass::Type,
            _ => ErrorClass::Generic,
        };
        let stack = match err {
            RpcError::Remote(remote) => remote.stack.clone(),
            _ => None,
        };
        Self {
            error: class.wire_name().to_string(),
            message: err.to_string(),
            stack,
            code: err.code().map(str::to_string),
        }
    }
}
