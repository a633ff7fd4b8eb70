//! Explicit schema declaration
//!
//! Each persistable type declares its properties once through
//! [`ObjectSchema::builder`]. Types are registered with a store through a
//! [`SchemaSet`]; there is no reflection-based discovery.
//!
//! Property types are mapped to native kinds through the type-indexed kind
//! table. A type without a mapping makes `build()` fail with
//! [`Error::UnsupportedType`].

use crate::object::Persistable;
use rustc_hash::FxHashMap;
use std::any::{type_name, TypeId};
use tether_core::{kind_of, Error, Result, ValueKind};

/// Table targeted by a link or link-list property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTarget {
    /// Type identity of the target facade
    pub type_id: TypeId,
    /// Native table of the target type
    pub table: &'static str,
}

/// One declared property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    /// Property name; also the native column name
    pub name: String,
    /// Native storage kind
    pub kind: ValueKind,
    /// Whether the property admits null
    pub nullable: bool,
    /// Target type of relationship properties
    pub target: Option<LinkTarget>,
}

/// Declared schema of one persistable type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    type_id: TypeId,
    type_name: &'static str,
    table: &'static str,
    properties: Vec<PropertySchema>,
}

impl ObjectSchema {
    /// Start declaring the schema of `T`
    pub fn builder<T: Persistable>() -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            schema: ObjectSchema {
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                table: T::TABLE,
                properties: Vec::new(),
            },
            error: None,
        }
    }

    /// Type identity of the facade
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the facade
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Native table name
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Declared properties in declaration order
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Property by name
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Builder returned by [`ObjectSchema::builder`]
///
/// The first failure is kept and reported by [`build`](Self::build).
#[derive(Debug)]
pub struct ObjectSchemaBuilder {
    schema: ObjectSchema,
    error: Option<Error>,
}

impl ObjectSchemaBuilder {
    /// Declare a scalar property of type `V`. `Option<V>` declares a nullable one.
    pub fn property<V: 'static>(mut self, name: &str) -> Self {
        match kind_of::<V>() {
            Ok(info) => self.push(name, info.kind, info.nullable, None),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Declare a single link to a `U`. Links are always nullable.
    pub fn link<U: Persistable>(mut self, name: &str) -> Self {
        let target = LinkTarget {
            type_id: TypeId::of::<U>(),
            table: U::TABLE,
        };
        self.push(name, ValueKind::Link, true, Some(target));
        self
    }

    /// Declare an ordered list of links to `U`
    pub fn link_list<U: Persistable>(mut self, name: &str) -> Self {
        let target = LinkTarget {
            type_id: TypeId::of::<U>(),
            table: U::TABLE,
        };
        self.push(name, ValueKind::LinkList, false, Some(target));
        self
    }

    fn push(&mut self, name: &str, kind: ValueKind, nullable: bool, target: Option<LinkTarget>) {
        if name.is_empty() {
            self.error.get_or_insert_with(|| {
                Error::schema_mismatch(format!(
                    "{} declares a property with an empty name",
                    self.schema.type_name
                ))
            });
            return;
        }
        if self.schema.property(name).is_some() {
            self.error.get_or_insert_with(|| {
                Error::schema_mismatch(format!(
                    "{} declares property '{}' twice",
                    self.schema.type_name, name
                ))
            });
            return;
        }
        self.schema.properties.push(PropertySchema {
            name: name.to_string(),
            kind,
            nullable,
            target,
        });
    }

    /// Finish the declaration
    ///
    /// # Errors
    ///
    /// The first declaration error: [`Error::UnsupportedType`] for an unmapped
    /// property type, [`Error::SchemaMismatch`] for duplicate or empty names.
    pub fn build(self) -> Result<ObjectSchema> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.schema),
        }
    }
}

/// Types registered with a store
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: Vec<ObjectSchema>,
    by_type: FxHashMap<TypeId, usize>,
}

impl SchemaSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` using its declared schema. Registering twice is a no-op.
    ///
    /// # Errors
    ///
    /// Errors from [`Persistable::schema`], and [`Error::SchemaMismatch`] if
    /// another registered type already uses the same table name.
    pub fn register<T: Persistable>(mut self) -> Result<Self> {
        if self.by_type.contains_key(&TypeId::of::<T>()) {
            return Ok(self);
        }
        let schema = T::schema()?;
        if let Some(other) = self.schemas.iter().find(|s| s.table == schema.table) {
            return Err(Error::schema_mismatch(format!(
                "{} and {} both map to table '{}'",
                other.type_name, schema.type_name, schema.table
            )));
        }
        self.by_type.insert(schema.type_id, self.schemas.len());
        self.schemas.push(schema);
        Ok(self)
    }

    /// Schema of a registered type
    pub fn get(&self, type_id: TypeId) -> Option<&ObjectSchema> {
        self.by_type.get(&type_id).map(|&i| &self.schemas[i])
    }

    /// Whether `type_id` is registered
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    /// Registered schemas in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.iter()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True when no type is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Check that every link target is itself registered.
    pub fn validate(&self) -> Result<()> {
        for schema in &self.schemas {
            for property in &schema.properties {
                if let Some(target) = property.target {
                    if !self.contains(target.type_id) {
                        return Err(Error::schema_mismatch(format!(
                            "{}.{} links to table '{}' whose type is not registered",
                            schema.type_name, property.name, target.table
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
