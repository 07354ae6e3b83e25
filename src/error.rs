//! Error types raised by the bridge
//!
//! Native call *failures* (a callee reporting a domain error) are not
//! represented here: the invoker turns them into value-level results.

use crate::interop::{CallError, LoadError};
use std::fmt;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Why an element access on a compound was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    NotReadable,
    NotWritable,
    Missing,
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReadable => write!(f, "not readable"),
            Self::NotWritable => write!(f, "not writable"),
            Self::Missing => write!(f, "no such element"),
        }
    }
}

/// Errors that abort the current bridge operation
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A type descriptor the marshaller cannot handle
    #[error("cannot marshal {context}: {detail}")]
    Encoding { context: &'static str, detail: String },

    /// Wrong dynamic value at a 1-based argument position
    #[error("bad argument #{position} ({expected} expected, got {got})")]
    Argument {
        position: usize,
        expected: String,
        got: String,
    },

    /// Field/property access refused
    #[error("{type_name}: `{element}' {reason}")]
    Access {
        type_name: String,
        element: String,
        reason: AccessReason,
    },

    /// Type is not bound in the repo table
    #[error("`{0}' not present in repo")]
    NotInRepo(String),

    /// Enum, flags or object type without a runtime type tag
    #[error("`{0}' has no runtime type")]
    MissingRuntimeType(String),

    /// Catalog lookup failed
    #[error("unable to resolve {0}")]
    Unresolved(String),

    /// Native symbol lookup failed
    #[error("symbol `{symbol}' not found")]
    Symbol { symbol: String },

    /// Dynamic library could not be opened
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Low-level dispatcher refused the call
    #[error(transparent)]
    Call(#[from] CallError),

    /// Extension hook reported a failure
    #[error("{hook} hook failed for `{type_name}': {message}")]
    Hook {
        hook: &'static str,
        type_name: String,
        message: String,
    },

    /// Configuration could not be read or parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn encoding(context: &'static str, detail: impl Into<String>) -> Self {
        Self::Encoding {
            context,
            detail: detail.into(),
        }
    }

    pub fn argument(position: usize, expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::Argument {
            position,
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn access(type_name: impl Into<String>, element: impl Into<String>, reason: AccessReason) -> Self {
        Self::Access {
            type_name: type_name.into(),
            element: element.into(),
            reason,
        }
    }

    /// Error suitable for returning from an extension hook
    pub fn hook(hook: &'static str, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook,
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the caller's dynamic values
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::Argument { .. })
    }
}
