//! Native error descriptor
//!
//! Every fallible native call reports its outcome through an out-parameter
//! [`ErrorDescriptor`]. A cleared descriptor (kind [`NativeErrorKind::None`])
//! means success. When the descriptor is set, the nominal return value of the
//! call is undefined and must be ignored.

use std::fmt;

/// Error category reported by the native engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NativeErrorKind {
    /// No error (success)
    #[default]
    None = 0,
    /// The raw handle is unknown to the engine or was destroyed
    InvalidHandle = 1,
    /// The row behind a row handle was deleted
    RowDetached = 2,
    /// An index argument was outside the valid range
    IndexOutOfRange = 3,
    /// A mutation was issued without an open write transaction
    NotInWriteTransaction = 4,
    /// A write transaction is already open
    WriteTransactionActive = 5,
    /// A table or column definition conflicts with the existing schema
    SchemaViolation = 6,
    /// The accessor does not match the column type
    TypeMismatch = 7,
    /// Any other engine failure
    Internal = 255,
}

impl fmt::Display for NativeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeErrorKind::None => "none",
            NativeErrorKind::InvalidHandle => "invalid handle",
            NativeErrorKind::RowDetached => "row detached",
            NativeErrorKind::IndexOutOfRange => "index out of range",
            NativeErrorKind::NotInWriteTransaction => "not in write transaction",
            NativeErrorKind::WriteTransactionActive => "write transaction active",
            NativeErrorKind::SchemaViolation => "schema violation",
            NativeErrorKind::TypeMismatch => "type mismatch",
            NativeErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Out-parameter filled by fallible native calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDescriptor {
    kind: NativeErrorKind,
    message: String,
}

impl ErrorDescriptor {
    /// Create a cleared descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. Overwrites any previous error.
    pub fn set(&mut self, kind: NativeErrorKind, message: impl Into<String>) {
        self.kind = kind;
        self.message = message.into();
    }

    /// True when an error has been recorded
    pub fn is_set(&self) -> bool {
        self.kind != NativeErrorKind::None
    }

    /// Error kind (`None` on success)
    pub fn kind(&self) -> NativeErrorKind {
        self.kind
    }

    /// Error message (empty on success)
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the recorded error, leaving the descriptor cleared
    pub fn take(&mut self) -> Option<(NativeErrorKind, String)> {
        if !self.is_set() {
            return None;
        }
        let kind = std::mem::take(&mut self.kind);
        Some((kind, std::mem::take(&mut self.message)))
    }
}
