//! Core types and traits for Tether
//!
//! This crate defines the foundational types shared by the native engine
//! interface and the binding layer:
//! - Error: the binding error taxonomy
//! - ErrorDescriptor / NativeErrorKind: the out-parameter error convention of native calls
//! - Value: unified value enum crossing the call boundary
//! - ValueKind: native column storage kinds and the type-indexed kind table
//! - Identifiers: RawHandle, HandleKind, ColumnIndex, RowKey, SchemaGeneration,
//!   CorrelationToken, StoreId

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod kind;
pub mod types;
pub mod value;

pub use descriptor::{ErrorDescriptor, NativeErrorKind};
pub use error::{Error, Result};
pub use kind::{kind_of, ColumnType, KindInfo, ValueKind};
pub use types::{
    ColumnIndex, CorrelationToken, HandleKind, RawHandle, RowKey, SchemaGeneration, StoreId,
    NOT_FOUND,
};
pub use value::Value;
