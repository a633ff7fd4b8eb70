//! Store: the entry point of the binding
//!
//! A [`Store`] owns the native store handle, one table handle per registered
//! type, the metadata cache and the notification registry. Opening a store
//! creates any missing tables and columns for the registered schemas in a
//! single write transaction.
//!
//! A store and its objects are confined to the thread that opened them;
//! handles are reference counted with `Rc` and are neither `Send` nor `Sync`.
//! Open one store per thread on the same path to share data across threads.
//!
//! # Example
//!
//! ```ignore
//! let schemas = SchemaSet::new().register::<Person>()?;
//! let store = Store::open(engine, BindingConfig::with_path("people"), schemas)?;
//!
//! let ada = Rc::new(Person::new("Ada"));
//! store.write(|_| store.add(&ada))?;
//! assert_eq!(ada.core().get::<String>("name")?, "Ada");
//! ```

use crate::config::BindingConfig;
use crate::handle::NativeHandle;
use crate::marshal;
use crate::metadata::{Metadata, MetadataCache};
use crate::notify::NotificationRegistry;
use crate::object::{Managed, ObjectCore, Persistable, RowWriter};
use crate::schema::{PropertySchema, SchemaSet};
use rustc_hash::FxHashMap;
use std::any::{type_name, TypeId};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tether_core::{
    CorrelationToken, Error, HandleKind, Result, RowKey, SchemaGeneration, StoreId,
};
use tether_native::NativeEngine;
use tracing::{debug, info, warn};

pub(crate) struct StoreInner {
    id: StoreId,
    config: BindingConfig,
    handle: NativeHandle,
    schemas: SchemaSet,
    tables: FxHashMap<TypeId, NativeHandle>,
    metadata: MetadataCache,
    generation: Cell<SchemaGeneration>,
    registry: Rc<NotificationRegistry>,
    writing: Cell<bool>,
    closed: Cell<bool>,
}

impl StoreInner {
    pub(crate) fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    pub(crate) fn registry(&self) -> &Rc<NotificationRegistry> {
        &self.registry
    }

    pub(crate) fn capacity(&self) -> usize {
        self.config.string_buffer_capacity
    }

    pub(crate) fn generation(&self) -> SchemaGeneration {
        self.generation.get()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(Error::InvalidatedHandle {
                kind: HandleKind::Store,
            });
        }
        Ok(())
    }

    pub(crate) fn require_write(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.writing.get() {
            return Err(Error::NotInWriteScope);
        }
        Ok(())
    }

    fn table(&self, type_id: TypeId) -> Result<&NativeHandle> {
        self.tables.get(&type_id).ok_or_else(|| {
            Error::schema_mismatch(format!("type {:?} is not registered with this store", type_id))
        })
    }

    fn table_of<T: Persistable>(&self) -> Result<&NativeHandle> {
        self.tables.get(&TypeId::of::<T>()).ok_or_else(|| {
            Error::schema_mismatch(format!(
                "{} is not registered with this store",
                type_name::<T>()
            ))
        })
    }

    /// Metadata of `type_id` for the current generation
    pub(crate) fn metadata(&self, type_id: TypeId) -> Result<Arc<Metadata>> {
        let generation = self.generation.get();
        self.metadata.get_or_build(generation, type_id, || {
            let schema = self.schemas.get(type_id).ok_or_else(|| {
                Error::schema_mismatch(format!("type {:?} has no registered schema", type_id))
            })?;
            Metadata::build(self.table(type_id)?, schema, generation, self.capacity())
        })
    }

    fn wrap<T: Persistable>(self: &Rc<Self>, row: NativeHandle) -> Result<Rc<T>> {
        let metadata = self.metadata(TypeId::of::<T>())?;
        let core = ObjectCore::bound(Managed::new(Rc::clone(self), row, metadata));
        Ok(Rc::new(T::from_core(core)))
    }

    /// Facade for the row with `key`, if it exists
    pub(crate) fn find<T: Persistable>(self: &Rc<Self>, key: RowKey) -> Result<Option<Rc<T>>> {
        self.ensure_open()?;
        let row = self
            .table_of::<T>()?
            .acquire_optional(HandleKind::Row, |e, raw, err| e.find_row(raw, key.get(), err))?;
        row.map(|row| self.wrap::<T>(row)).transpose()
    }

    /// Bind an unmanaged object to a new row and copy its fields.
    ///
    /// Re-attaching a live object of this store is a no-op.
    pub(crate) fn attach<T: Persistable>(
        self: &Rc<Self>,
        object: &Rc<T>,
        auto_attach: bool,
    ) -> Result<()> {
        self.require_write()?;
        let core = object.core();
        if let Some(owner) = core.store() {
            if Rc::ptr_eq(owner, self) {
                if core.is_valid() {
                    return Ok(());
                }
                return Err(Error::InvalidatedHandle {
                    kind: HandleKind::Row,
                });
            }
            return Err(Error::not_managed(format!(
                "attach a {} owned by another store",
                type_name::<T>()
            )));
        }

        let metadata = self.metadata(TypeId::of::<T>())?;
        let row = self
            .table_of::<T>()?
            .acquire(HandleKind::Row, |e, raw, err| e.add_row(raw, err))?;
        core.bind(Managed::new(Rc::clone(self), row, metadata))?;
        debug!(target: "tether::store", store = %self.id, type_name = type_name::<T>(), "Object attached");
        object.copy_to(&RowWriter::new(core, auto_attach))
    }

    /// Rebuild metadata if the native schema moved on
    fn sync_generation(&self) -> Result<()> {
        let current = SchemaGeneration::new(
            self.handle
                .call(|e, raw, err| e.schema_version(raw, err))?,
        );
        let previous = self.generation.get();
        if current == previous {
            return Ok(());
        }

        let mut rebuilt = Vec::with_capacity(self.schemas.len());
        for schema in self.schemas.iter() {
            let table = self.table(schema.type_id())?;
            rebuilt.push(Metadata::build(table, schema, current, self.capacity())?);
        }
        for metadata in rebuilt {
            self.metadata.insert(metadata)?;
        }
        self.generation.set(current);
        let evicted = self.metadata.evict_stale(current);
        debug!(target: "tether::schema", store = %self.id, from = %previous, to = %current, evicted, "Schema generation changed");
        Ok(())
    }

    pub(crate) fn refresh(&self) -> Result<usize> {
        self.ensure_open()?;
        if self.writing.get() {
            debug!(target: "tether::store", store = %self.id, "Refresh deferred by open write scope");
            return Ok(0);
        }
        self.sync_generation()?;

        let mut deliveries: Vec<(CorrelationToken, usize)> = Vec::new();
        self.handle.call(|e, raw, err| {
            e.refresh(
                raw,
                &mut |token: CorrelationToken, column: usize| deliveries.push((token, column)),
                err,
            )
        })?;
        let delivered = self.registry.dispatch(&deliveries);
        debug!(target: "tether::store", store = %self.id, received = deliveries.len(), delivered, "Store refreshed");
        Ok(delivered)
    }

    fn close(&self) -> Result<()> {
        if self.closed.replace(true) {
            return Ok(());
        }
        self.writing.set(false);

        let mut first_error = None;
        for token in self.registry.tokens() {
            let removed = self
                .handle
                .with_raw(|e, _| marshal::call(|err| e.remove_observed_object(token, err)));
            self.registry.release(token);
            if let Err(e) = removed {
                first_error.get_or_insert(e);
            }
        }

        let released = self.handle.release();
        info!(target: "tether::store", store = %self.id, path = %self.config.path, "Store closed");
        match first_error {
            Some(e) => Err(e),
            None => released,
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "tether::store", store = %self.id, error = %e, "Failed to close store");
        }
    }
}

/// Open native store with registered object types
///
/// Clones share the same native store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Open a store on `config.path` and sync the registered schemas.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid config; [`Error::SchemaMismatch`] if a
    /// schema links to an unregistered type or disagrees with existing columns;
    /// native failures.
    pub fn open(
        engine: Arc<dyn NativeEngine>,
        config: BindingConfig,
        schemas: SchemaSet,
    ) -> Result<Self> {
        config.validate()?;
        schemas.validate()?;

        let path = config.path.clone();
        let handle = NativeHandle::open(engine, HandleKind::Store, |e, err| {
            e.open_store(&path, err)
        })?;
        let tables = sync_schema(&handle, &schemas)?;
        let generation =
            SchemaGeneration::new(handle.call(|e, raw, err| e.schema_version(raw, err))?);

        let inner = Rc::new(StoreInner {
            id: StoreId::new(),
            config,
            handle,
            schemas,
            tables,
            metadata: MetadataCache::new(),
            generation: Cell::new(generation),
            registry: Rc::new(NotificationRegistry::new()),
            writing: Cell::new(false),
            closed: Cell::new(false),
        });
        for schema in inner.schemas.iter() {
            inner.metadata(schema.type_id())?;
        }

        info!(
            target: "tether::store",
            store = %inner.id,
            path = %inner.config.path,
            types = inner.schemas.len(),
            %generation,
            "Store opened"
        );
        Ok(Self { inner })
    }

    /// Identity of this store instance
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Config the store was opened with
    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    /// Current native schema generation
    pub fn schema_generation(&self) -> SchemaGeneration {
        self.inner.generation.get()
    }

    /// Whether a write scope is open on this store
    pub fn is_in_write(&self) -> bool {
        self.inner.writing.get()
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of live notification registrations
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Open a write scope. Dropping the scope without commit rolls back.
    ///
    /// # Errors
    ///
    /// Native `WriteTransactionActive` if this store or another store on the
    /// same path already writes.
    pub fn begin_write(&self) -> Result<WriteScope<'_>> {
        self.inner.ensure_open()?;
        self.inner
            .handle
            .call(|e, raw, err| e.begin_write(raw, err))?;
        self.inner.writing.set(true);
        debug!(target: "tether::store", store = %self.inner.id, "Write scope opened");
        Ok(WriteScope {
            store: self,
            finished: Cell::new(false),
        })
    }

    /// Run `f` in a write scope; commit on `Ok`, roll back on `Err`.
    pub fn write<R>(&self, f: impl FnOnce(&WriteScope<'_>) -> Result<R>) -> Result<R> {
        let scope = self.begin_write()?;
        match f(&scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = scope.rollback() {
                    warn!(target: "tether::store", error = %rollback, "Rollback after failed write failed");
                }
                Err(e)
            }
        }
    }

    /// Attach an unmanaged object to a new row.
    ///
    /// Unmanaged link targets set in [`Persistable::copy_to`] are attached
    /// too, one level deep.
    pub fn add<T: Persistable>(&self, object: &Rc<T>) -> Result<()> {
        self.inner.attach(object, true)
    }

    /// Object with row key `key`
    pub fn find<T: Persistable>(&self, key: RowKey) -> Result<Option<Rc<T>>> {
        self.inner.find::<T>(key)
    }

    /// Number of `T` rows
    pub fn count<T: Persistable>(&self) -> Result<usize> {
        self.inner.ensure_open()?;
        self.inner
            .table_of::<T>()?
            .call(|e, raw, err| e.table_size(raw, err))
    }

    /// Object at row position `index`
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `index >= count()`.
    pub fn object_at<T: Persistable>(&self, index: usize) -> Result<Rc<T>> {
        let size = self.count::<T>()?;
        if index >= size {
            return Err(Error::OutOfRange { index, size });
        }
        let row = self
            .inner
            .table_of::<T>()?
            .acquire(HandleKind::Row, |e, raw, err| e.row_at(raw, index, err))?;
        self.inner.wrap::<T>(row)
    }

    /// Every `T` object in row order
    pub fn all<T: Persistable>(&self) -> Result<Vec<Rc<T>>> {
        (0..self.count::<T>()?)
            .map(|i| self.object_at::<T>(i))
            .collect()
    }

    /// Delete the object's row and release this facade's handle.
    ///
    /// Links to the row are nullified. Other facades of the same row see
    /// native `RowDetached` errors afterwards.
    pub fn remove<T: Persistable>(&self, object: &Rc<T>) -> Result<()> {
        self.inner.require_write()?;
        let core = object.core();
        match core.store() {
            Some(owner) if Rc::ptr_eq(owner, &self.inner) => {}
            Some(_) => {
                return Err(Error::not_managed(
                    "remove an object owned by another store",
                ))
            }
            None => return Err(Error::not_managed("remove an unmanaged object")),
        }
        let row = core
            .row()
            .ok_or_else(|| Error::not_managed("remove an unmanaged object"))?;
        row.call(|e, raw, err| e.remove_row(raw, err))?;
        row.release()
    }

    /// Deliver pending change notifications. Returns the number delivered.
    ///
    /// Also picks up schema changes made through other stores on the same
    /// path. Deferred while a write scope is open.
    pub fn refresh(&self) -> Result<usize> {
        self.inner.refresh()
    }

    /// Unsubscribe every observer and release the native store.
    ///
    /// Every handle derived from this store becomes invalid. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("path", &self.inner.config.path)
            .field("generation", &self.inner.generation.get())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

/// Open write transaction on a [`Store`]
///
/// Mutations of managed objects are only accepted while a scope is open.
pub struct WriteScope<'s> {
    store: &'s Store,
    finished: Cell<bool>,
}

impl<'s> WriteScope<'s> {
    /// Store this scope writes to
    pub fn store(&self) -> &'s Store {
        self.store
    }

    /// Commit and, with `auto_refresh`, deliver notifications.
    ///
    /// A refresh error is returned after the commit itself succeeded.
    pub fn commit(self) -> Result<()> {
        self.finished.set(true);
        let inner = &self.store.inner;
        let committed = inner.handle.call(|e, raw, err| e.commit_write(raw, err));
        inner.writing.set(false);
        if let Err(e) = committed {
            if let Err(rollback) = inner.handle.call(|e, raw, err| e.rollback_write(raw, err)) {
                warn!(target: "tether::store", error = %rollback, "Rollback after failed commit failed");
            }
            return Err(e);
        }
        debug!(target: "tether::store", store = %inner.id, "Write scope committed");
        if inner.config.auto_refresh {
            inner.refresh()?;
        }
        Ok(())
    }

    /// Discard every change made in this scope
    pub fn rollback(self) -> Result<()> {
        self.finished.set(true);
        self.discard()
    }

    fn discard(&self) -> Result<()> {
        let inner = &self.store.inner;
        if inner.is_closed() {
            return Ok(());
        }
        inner.writing.set(false);
        inner
            .handle
            .call(|e, raw, err| e.rollback_write(raw, err))?;
        debug!(target: "tether::store", store = %inner.id, "Write scope rolled back");
        Ok(())
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.finished.replace(true) {
            if let Err(e) = self.discard() {
                warn!(target: "tether::store", error = %e, "Failed to roll back dropped write scope");
            }
        }
    }
}

impl fmt::Debug for WriteScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteScope")
            .field("store", &self.store.inner.id)
            .field("finished", &self.finished.get())
            .finish()
    }
}

/// Open the table of every schema, creating missing tables and columns.
fn sync_schema(
    store: &NativeHandle,
    schemas: &SchemaSet,
) -> Result<FxHashMap<TypeId, NativeHandle>> {
    let mut tables = FxHashMap::default();
    let mut missing_tables = Vec::new();
    for schema in schemas.iter() {
        let table = store.acquire_optional(HandleKind::Table, |e, raw, err| {
            e.get_table(raw, schema.table(), err)
        })?;
        match table {
            Some(table) => {
                tables.insert(schema.type_id(), table);
            }
            None => missing_tables.push(schema.type_id()),
        }
    }

    let mut missing_columns: Vec<(TypeId, &PropertySchema)> = Vec::new();
    for schema in schemas.iter() {
        let table = match tables.get(&schema.type_id()) {
            Some(table) => table,
            None => {
                missing_columns.extend(schema.properties().iter().map(|p| (schema.type_id(), p)));
                continue;
            }
        };
        for property in schema.properties() {
            let name = property.name.as_str();
            let index = table.call(|e, raw, err| e.column_index(raw, name, err))?;
            if marshal::optional_index(index).is_none() {
                missing_columns.push((schema.type_id(), property));
            }
        }
    }

    if missing_tables.is_empty() && missing_columns.is_empty() {
        return Ok(tables);
    }

    store.call(|e, raw, err| e.begin_write(raw, err))?;
    match create_missing(store, schemas, &mut tables, &missing_tables, &missing_columns) {
        Ok(()) => {
            store.call(|e, raw, err| e.commit_write(raw, err))?;
            info!(
                target: "tether::schema",
                tables = missing_tables.len(),
                columns = missing_columns.len(),
                "Schema created"
            );
            Ok(tables)
        }
        Err(e) => {
            if let Err(rollback) = store.call(|e, raw, err| e.rollback_write(raw, err)) {
                warn!(target: "tether::schema", error = %rollback, "Rollback of schema creation failed");
            }
            Err(e)
        }
    }
}

fn create_missing(
    store: &NativeHandle,
    schemas: &SchemaSet,
    tables: &mut FxHashMap<TypeId, NativeHandle>,
    missing_tables: &[TypeId],
    missing_columns: &[(TypeId, &PropertySchema)],
) -> Result<()> {
    for type_id in missing_tables {
        let schema = schemas.get(*type_id).ok_or_else(|| {
            Error::schema_mismatch(format!("type {:?} has no registered schema", type_id))
        })?;
        let name = schema.table();
        let table = store.acquire(HandleKind::Table, |e, raw, err| e.add_table(raw, name, err))?;
        tables.insert(*type_id, table);
    }

    for (type_id, property) in missing_columns {
        let table = tables.get(type_id).ok_or_else(|| {
            Error::schema_mismatch(format!("type {:?} has no table", type_id))
        })?;
        let name = property.name.as_str();
        let kind = property.kind.tag();
        match property.target {
            Some(target) => {
                let target_table = tables.get(&target.type_id).ok_or_else(|| {
                    Error::schema_mismatch(format!(
                        "link '{}' targets unregistered table {}",
                        name, target.table
                    ))
                })?;
                target_table.with_raw(|_, target_raw| {
                    table.call(|e, raw, err| e.add_link_column(raw, kind, name, target_raw, err))
                })?;
            }
            None => {
                let nullable = property.nullable;
                table.call(|e, raw, err| e.add_column(raw, kind, name, nullable, err))?;
            }
        }
    }
    Ok(())
}
