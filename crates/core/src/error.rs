//! Error types for the binding layer
//!
//! This module defines the error taxonomy surfaced by every fallible binding
//! operation. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! The bridge is fail-fast: nothing here is retried or recovered locally.
//! Errors reported by the native engine are carried verbatim in
//! [`Error::NativeEngine`].

use crate::descriptor::NativeErrorKind;
use crate::types::HandleKind;
use thiserror::Error;

/// Result type alias for binding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the binding layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The handle (or one of its ancestors) was already released
    #[error("Invalidated handle: {kind} handle is no longer valid")]
    InvalidatedHandle {
        /// Kind of the handle that was used
        kind: HandleKind,
    },

    /// A property, link-list or notification operation on an unmanaged object
    #[error("Object is not managed: cannot {operation}")]
    NotManaged {
        /// Operation that required a managed object
        operation: String,
    },

    /// A resolved property no longer matches the current schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A declared property type has no native value-kind mapping
    #[error("Unsupported property type: {type_name}")]
    UnsupportedType {
        /// Rust type name of the rejected type
        type_name: &'static str,
    },

    /// Variable-length data broke the buffer-growth protocol or failed to decode
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Link-list index outside `[0, size)`
    #[error("Index {index} out of range for list of size {size}")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Size of the list at the time of the call
        size: usize,
    },

    /// A mutation was attempted outside an active write scope
    #[error("Mutation attempted outside a write scope")]
    NotInWriteScope,

    /// Error descriptor reported by the native engine
    #[error("Native engine error ({kind}): {message}")]
    NativeEngine {
        /// Kind reported by the native side
        kind: NativeErrorKind,
        /// Message reported by the native side
        message: String,
    },

    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::NotManaged`]
    pub fn not_managed(operation: impl Into<String>) -> Self {
        Error::NotManaged {
            operation: operation.into(),
        }
    }

    /// Shorthand for [`Error::SchemaMismatch`]
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Error::SchemaMismatch(message.into())
    }

    /// Shorthand for [`Error::CorruptedData`]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Error::CorruptedData(message.into())
    }

    /// Check whether this error came from the native engine with the given kind
    pub fn is_native(&self, expected: NativeErrorKind) -> bool {
        matches!(self, Error::NativeEngine { kind, .. } if *kind == expected)
    }
}
