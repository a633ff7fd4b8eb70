//! Identifier types shared across the native boundary
//!
//! This module defines the foundational identifiers:
//! - RawHandle: opaque reference to a native resource
//! - HandleKind: which kind of native resource a handle refers to
//! - ColumnIndex / RowKey: addressing within a table
//! - SchemaGeneration: version of the native schema that produced column indices
//! - CorrelationToken: identifier linking a native observer to a weakly-held object
//! - StoreId: identity of one opened store instance

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sentinel returned by native lookups that found nothing.
///
/// Never leaves the binding layer: the marshalling protocol converts it to `Option`.
pub const NOT_FOUND: usize = usize::MAX;

/// Opaque reference to a native resource
///
/// The value is meaningless outside the engine that issued it. `RawHandle::NULL`
/// is never issued for a live resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(u64);

impl RawHandle {
    /// The null handle
    pub const NULL: RawHandle = RawHandle(0);

    /// Wrap a raw value issued by an engine
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// True for [`RawHandle::NULL`]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of native resource behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// An opened store
    Store,
    /// A table within a store
    Table,
    /// A row within a table
    Row,
    /// An ordered link list owned by a row
    LinkList,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Store => "store",
            HandleKind::Table => "table",
            HandleKind::Row => "row",
            HandleKind::LinkList => "link list",
        };
        f.write_str(name)
    }
}

/// Column position within a table, valid for one [`SchemaGeneration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnIndex(usize);

impl ColumnIndex {
    /// Wrap a column position
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Column position
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ColumnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a row within its table
///
/// Unlike a row position, a key does not shift when other rows are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(u64);

impl RowKey {
    /// Wrap a raw key
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Raw key
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of the native schema
///
/// Incremented by the engine on every table or column addition. Column indices
/// resolved under one generation are never reused under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaGeneration(u64);

impl SchemaGeneration {
    /// Wrap a raw schema version
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Raw schema version
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Opaque token handed to the native engine when observing a row
///
/// Tokens are issued monotonically and never reused, so a stale token from a
/// torn-down registration can never resolve to a newer subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(u64);

impl CorrelationToken {
    /// Wrap a raw token
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

/// Identity of one opened store instance
///
/// Two stores opened on the same native path have different `StoreId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Create a new random StoreId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
