//! Tether - binds language-level objects to a native row engine
//!
//! Objects are plain Rust types implementing [`Persistable`]. Once added to a
//! [`Store`] they read and write their properties straight through native
//! handles, follow links and link lists, and raise property-changed events
//! when other stores on the same path commit changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use tether::{BindingConfig, InMemoryEngine, SchemaSet, Store};
//!
//! let engine = Arc::new(InMemoryEngine::new());
//! let schemas = SchemaSet::new().register::<Person>()?;
//! let store = Store::open(engine, BindingConfig::with_path("people"), schemas)?;
//!
//! let ada = Rc::new(Person::new("Ada", 36));
//! store.write(|_| store.add(&ada))?;
//! assert_eq!(ada.core().get::<i64>("age")?, 36);
//! ```
//!
//! # Architecture
//!
//! - `tether-core`: errors, values, identifiers and the kind table
//! - `tether-native`: the [`NativeEngine`] surface and [`InMemoryEngine`]
//! - `tether-binding`: handles, metadata, facades and notifications

pub use tether_binding::*;
pub use tether_core::{
    kind_of, ColumnIndex, ColumnType, CorrelationToken, Error, ErrorDescriptor, HandleKind,
    KindInfo, NativeErrorKind, RawHandle, Result, RowKey, SchemaGeneration, StoreId, Value,
    ValueKind, NOT_FOUND,
};
pub use tether_native::{EngineStats, InMemoryEngine, NativeEngine};
