//! Schema metadata cache
//!
//! [`Metadata`] maps every property of one type to its native column index,
//! kind and link target, as resolved under one [`SchemaGeneration`]. Building
//! it performs one native column lookup per property; afterwards every
//! resolution is a hash lookup.
//!
//! The [`MetadataCache`] is keyed by `(generation, type)`. Entries for an old
//! generation are never handed out under a new one: after a schema change the
//! store rebuilds metadata and evicts the stale entries.
//!
//! Concurrent first builds of the same key race on insertion. The first
//! writer wins; a later builder that resolved different columns fails with
//! [`Error::SchemaMismatch`].

use crate::handle::NativeHandle;
use crate::marshal;
use crate::schema::{ObjectSchema, PropertySchema};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::sync::Arc;
use tether_core::{ColumnIndex, Error, Result, SchemaGeneration, ValueKind};
use tracing::debug;

/// Resolved metadata of one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMetadata {
    /// Property name
    pub name: String,
    /// Native column index, valid for the owning metadata's generation
    pub column: ColumnIndex,
    /// Native storage kind
    pub kind: ValueKind,
    /// Whether the column admits null
    pub nullable: bool,
    /// Type identity of the link target, for relationship properties
    pub target: Option<TypeId>,
}

/// Resolved metadata of one persistable type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    type_id: TypeId,
    type_name: &'static str,
    table: &'static str,
    generation: SchemaGeneration,
    properties: Vec<PropertyMetadata>,
    by_name: FxHashMap<String, usize>,
    by_column: FxHashMap<usize, usize>,
}

impl Metadata {
    /// Resolve every property of `schema` against the native `table`.
    ///
    /// # Errors
    ///
    /// [`Error::SchemaMismatch`] if a column is missing or disagrees with the
    /// declaration in kind, nullability or link target; native failures.
    pub fn build(
        table: &NativeHandle,
        schema: &ObjectSchema,
        generation: SchemaGeneration,
        capacity: usize,
    ) -> Result<Self> {
        let mut properties = Vec::with_capacity(schema.properties().len());
        for declared in schema.properties() {
            properties.push(resolve_property(table, schema, declared, capacity)?);
        }

        let by_name = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let by_column = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.column.get(), i))
            .collect();

        debug!(
            target: "tether::schema",
            type_name = schema.type_name(),
            table = schema.table(),
            %generation,
            properties = properties.len(),
            "Metadata built"
        );
        Ok(Self {
            type_id: schema.type_id(),
            type_name: schema.type_name(),
            table: schema.table(),
            generation,
            properties,
            by_name,
            by_column,
        })
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

    /// Generation the column indices belong to
    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    /// All properties in declaration order
    pub fn properties(&self) -> &[PropertyMetadata] {
        &self.properties
    }

    /// Resolve a property by name
    ///
    /// # Errors
    ///
    /// [`Error::SchemaMismatch`] if the type has no such property.
    pub fn property(&self, name: &str) -> Result<&PropertyMetadata> {
        match self.by_name.get(name) {
            Some(&i) => Ok(&self.properties[i]),
            None => Err(Error::schema_mismatch(format!(
                "{} has no property '{}'",
                self.type_name, name
            ))),
        }
    }

    /// Map a native column index back to its property
    pub fn property_at(&self, column: usize) -> Option<&PropertyMetadata> {
        self.by_column.get(&column).map(|&i| &self.properties[i])
    }

    /// Whether two builds resolved identical columns
    fn agrees_with(&self, other: &Metadata) -> bool {
        self.properties == other.properties
    }
}

fn resolve_property(
    table: &NativeHandle,
    schema: &ObjectSchema,
    declared: &PropertySchema,
    capacity: usize,
) -> Result<PropertyMetadata> {
    let name = declared.name.as_str();
    let index = table.call(|e, raw, err| e.column_index(raw, name, err))?;
    let column = match marshal::optional_index(index) {
        Some(column) => column,
        None => {
            return Err(Error::schema_mismatch(format!(
                "table '{}' has no column '{}'",
                schema.table(),
                name
            )))
        }
    };

    let tag = table.call(|e, raw, err| e.column_kind(raw, column, err))?;
    let kind = ValueKind::from_tag(tag).ok_or_else(|| {
        Error::schema_mismatch(format!(
            "column '{}.{}' has unknown type code {}",
            schema.table(),
            name,
            tag
        ))
    })?;
    if kind != declared.kind {
        return Err(Error::schema_mismatch(format!(
            "column '{}.{}' stores {} values, declared as {}",
            schema.table(),
            name,
            kind,
            declared.kind
        )));
    }

    let nullable = table.call(|e, raw, err| e.column_nullable(raw, column, err))?;
    if nullable != declared.nullable {
        return Err(Error::schema_mismatch(format!(
            "column '{}.{}' nullability is {}, declared {}",
            schema.table(),
            name,
            nullable,
            declared.nullable
        )));
    }

    let target = match declared.target {
        Some(expected) => {
            let actual = table.with_raw(|e, raw| {
                marshal::read_string(capacity, |buf, is_null, err| {
                    e.column_link_target(raw, column, buf, is_null, err)
                })
            })?;
            if actual.as_deref() != Some(expected.table) {
                return Err(Error::schema_mismatch(format!(
                    "column '{}.{}' links to {:?}, declared '{}'",
                    schema.table(),
                    name,
                    actual,
                    expected.table
                )));
            }
            Some(expected.type_id)
        }
        None => None,
    };

    Ok(PropertyMetadata {
        name: declared.name.clone(),
        column: ColumnIndex::new(column),
        kind,
        nullable,
        target,
    })
}

/// Shared cache of resolved metadata
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<(SchemaGeneration, TypeId), Arc<Metadata>>,
}

impl MetadataCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached metadata, if built
    pub fn get(&self, generation: SchemaGeneration, type_id: TypeId) -> Option<Arc<Metadata>> {
        self.entries
            .get(&(generation, type_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Cached metadata, building it with `build` on first use.
    ///
    /// `build` runs without holding any cache lock.
    ///
    /// # Errors
    ///
    /// Errors from `build`, and [`Error::SchemaMismatch`] if another builder
    /// inserted first with different columns.
    pub fn get_or_build(
        &self,
        generation: SchemaGeneration,
        type_id: TypeId,
        build: impl FnOnce() -> Result<Metadata>,
    ) -> Result<Arc<Metadata>> {
        if let Some(cached) = self.get(generation, type_id) {
            return Ok(cached);
        }
        let built = build()?;
        self.insert(built)
    }

    /// Insert built metadata; the first insertion for a key wins.
    pub fn insert(&self, metadata: Metadata) -> Result<Arc<Metadata>> {
        let key = (metadata.generation, metadata.type_id);
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                if existing.get().agrees_with(&metadata) {
                    Ok(Arc::clone(existing.get()))
                } else {
                    Err(Error::schema_mismatch(format!(
                        "conflicting metadata for {} under {}",
                        metadata.type_name, metadata.generation
                    )))
                }
            }
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(Arc::new(metadata)).value())),
        }
    }

    /// Drop every entry not built for `current`
    pub fn evict_stale(&self, current: SchemaGeneration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(generation, _), _| *generation == current);
        before - self.entries.len()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
