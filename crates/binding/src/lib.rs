//! Object binding layer for Tether
//!
//! This crate maps language-level objects onto rows of a [`NativeEngine`]:
//! - [`Store`] / [`WriteScope`]: opened stores and their write transactions
//! - [`Persistable`] / [`ObjectCore`]: object facades, managed or unmanaged
//! - [`LinkList`]: ordered to-many relationships
//! - [`SchemaSet`] / [`ObjectSchema`]: explicit schema declaration
//! - [`Metadata`]: property-to-column resolution, cached per schema generation
//! - [`NativeHandle`]: ownership of native handles with cascading release
//! - [`NotificationRegistry`]: correlation of native change callbacks to objects
//!
//! [`NativeEngine`]: tether_native::NativeEngine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod config;
pub mod handle;
pub mod link_list;
pub mod marshal;
pub mod metadata;
pub mod notify;
pub mod object;
pub mod schema;
pub mod store;

pub use config::{BindingConfig, CONFIG_FILE_NAME, DEFAULT_STRING_BUFFER_CAPACITY};
pub use handle::NativeHandle;
pub use link_list::LinkList;
pub use metadata::{Metadata, MetadataCache, PropertyMetadata};
pub use notify::{ChangeTarget, NotificationRegistry, NotificationToken};
pub use object::{Observable, ObjectCore, Persistable, RowWriter, SubscriptionId};
pub use schema::{LinkTarget, ObjectSchema, ObjectSchemaBuilder, PropertySchema, SchemaSet};
pub use store::{Store, WriteScope};
