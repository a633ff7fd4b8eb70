//! In-memory native engine
//!
//! A complete, in-process implementation of [`NativeEngine`]. Stores opened on
//! the same path share one data group, so two stores can observe each other's
//! commits. Nothing is written to disk.
//!
//! # Use Cases
//!
//! - Unit and integration tests of the binding layer
//! - Embedders that need ephemeral object storage
//!
//! # Transactions
//!
//! One write transaction per path at a time. `begin_write` snapshots the group
//! and `rollback_write` restores the snapshot. Committed changes to rows are
//! queued on every store of the path and delivered to observers by `refresh`.

mod state;

pub use state::EngineStats;

use crate::engine::NativeEngine;
use parking_lot::Mutex;
use state::{fail, Cell, Column, EngineState, NativeResult, Observer, StoreState, Table, Target};
use tether_core::{
    CorrelationToken, ErrorDescriptor, HandleKind, NativeErrorKind, RawHandle, ValueKind,
    NOT_FOUND,
};
use tracing::debug;

/// In-process engine keeping all data in memory
///
/// # Thread Safety
///
/// All state sits behind a single `parking_lot::Mutex`. The lock is never held
/// while change notifications are delivered.
///
/// # Example
///
/// ```ignore
/// use tether_native::{InMemoryEngine, NativeEngine};
///
/// let engine = InMemoryEngine::new();
/// let mut err = ErrorDescriptor::new();
/// let store = engine.open_store("people", &mut err);
/// assert!(!err.is_set());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    /// Create an engine with no stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the engine counters
    pub fn stats(&self) -> EngineStats {
        self.state.lock().stats()
    }

    /// Run `f` under the state lock, translating failures into `err`
    fn handle_errors<T: Default>(
        &self,
        err: &mut ErrorDescriptor,
        f: impl FnOnce(&mut EngineState) -> NativeResult<T>,
    ) -> T {
        let mut state = self.state.lock();
        match f(&mut *state) {
            Ok(value) => value,
            Err((kind, message)) => {
                err.set(kind, message);
                T::default()
            }
        }
    }

    fn read_fixed<T: Default>(
        &self,
        row: RawHandle,
        column: usize,
        kind: ValueKind,
        err: &mut ErrorDescriptor,
        read: impl FnOnce(&Cell) -> Option<T>,
    ) -> T {
        self.handle_errors(err, |s| {
            let cell = s.cell(row, column, kind)?;
            match read(cell) {
                Some(value) => Ok(value),
                None if *cell == Cell::Null => fail(
                    NativeErrorKind::TypeMismatch,
                    "null value read through a non-nullable accessor",
                ),
                None => fail(NativeErrorKind::Internal, "cell does not match column kind"),
            }
        })
    }

    fn read_nullable<T>(
        &self,
        row: RawHandle,
        column: usize,
        kind: ValueKind,
        out: &mut T,
        err: &mut ErrorDescriptor,
        read: impl FnOnce(&Cell) -> Option<T>,
    ) -> bool {
        self.handle_errors(err, |s| {
            let cell = s.cell(row, column, kind)?;
            if *cell == Cell::Null {
                return Ok(false);
            }
            match read(cell) {
                Some(value) => {
                    *out = value;
                    Ok(true)
                }
                None => fail(NativeErrorKind::Internal, "cell does not match column kind"),
            }
        })
    }

    fn read_bytes(
        &self,
        row: RawHandle,
        column: usize,
        kind: ValueKind,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.handle_errors(err, |s| match s.cell(row, column, kind)? {
            Cell::Null => Ok(copy_out(None, buffer, is_null)),
            Cell::Bytes(bytes) => Ok(copy_out(Some(bytes.as_slice()), buffer, is_null)),
            _ => fail(NativeErrorKind::Internal, "cell does not match column kind"),
        })
    }

    fn write(
        &self,
        row: RawHandle,
        column: usize,
        kind: ValueKind,
        value: Cell,
        err: &mut ErrorDescriptor,
    ) {
        self.handle_errors(err, |s| s.write_cell(row, column, kind, value))
    }

    fn add_column_inner(
        &self,
        table: RawHandle,
        kind: u8,
        name: &str,
        nullable: bool,
        target: Option<RawHandle>,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.handle_errors(err, |s| {
            let kind = match ValueKind::from_tag(kind) {
                Some(kind) => kind,
                None => return fail(NativeErrorKind::TypeMismatch, format!("unknown type code {}", kind)),
            };
            let (store, table_idx, _) = s.table(table)?;
            let target = match target {
                Some(target) => {
                    let (target_store, target_idx, _) = s.table(target)?;
                    if s.path(target_store)? != s.path(store)? {
                        return fail(
                            NativeErrorKind::SchemaViolation,
                            "link target belongs to another store path",
                        );
                    }
                    Some(target_idx)
                }
                None => None,
            };
            if kind.is_relationship() && target.is_none() {
                return fail(
                    NativeErrorKind::SchemaViolation,
                    format!("{} column '{}' requires a target table", kind, name),
                );
            }
            if !kind.is_relationship() && target.is_some() {
                return fail(
                    NativeErrorKind::SchemaViolation,
                    format!("{} column '{}' cannot target a table", kind, name),
                );
            }
            let group = s.writable_group(store)?;
            let t = &mut group.data.tables[table_idx];
            if t.columns.iter().any(|c| c.name == name) {
                return fail(
                    NativeErrorKind::SchemaViolation,
                    format!("column '{}' already exists in '{}'", name, t.name),
                );
            }
            let column = Column {
                name: name.to_string(),
                kind,
                nullable,
                target,
            };
            let cell = column.default_cell();
            for row in t.rows.iter_mut() {
                row.cells.push(cell.clone());
            }
            t.columns.push(column);
            let index = t.columns.len() - 1;
            group.data.schema_version += 1;
            Ok(index)
        })
    }
}

fn copy_out(bytes: Option<&[u8]>, buffer: &mut [u8], is_null: &mut bool) -> usize {
    match bytes {
        None => {
            *is_null = true;
            0
        }
        Some(bytes) => {
            *is_null = false;
            let n = bytes.len().min(buffer.len());
            buffer[..n].copy_from_slice(&bytes[..n]);
            bytes.len()
        }
    }
}

impl NativeEngine for InMemoryEngine {
    // ========================================================================
    // Store lifecycle
    // ========================================================================

    fn open_store(&self, path: &str, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            if path.is_empty() {
                return fail(NativeErrorKind::Internal, "store path must not be empty");
            }
            s.groups.entry(path.to_string()).or_default();
            let handle = s.issue(Target::Store);
            s.stores.insert(
                handle.as_raw(),
                StoreState {
                    path: path.to_string(),
                    pending: Vec::new(),
                },
            );
            debug!(target: "tether::engine", path, store = %handle, "Store opened");
            Ok(handle)
        })
    }

    fn schema_version(&self, store: RawHandle, err: &mut ErrorDescriptor) -> u64 {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            Ok(s.group(store)?.data.schema_version)
        })
    }

    fn begin_write(&self, store: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let group = s.group_mut(store)?;
            if group.writer.is_some() {
                return fail(
                    NativeErrorKind::WriteTransactionActive,
                    "a write transaction is already open on this path",
                );
            }
            group.writer = Some(store);
            group.backup = Some(group.data.clone());
            group.write_log.clear();
            Ok(())
        })
    }

    fn commit_write(&self, store: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let group = s.writable_group(store)?;
            group.writer = None;
            group.backup = None;
            let log = std::mem::take(&mut group.write_log);

            // Queue only changes to observed rows, once per column
            let path = s.path(store)?.to_string();
            let observers: Vec<Observer> = s.observers.values().copied().collect();
            for (id, state) in s.stores.iter_mut().filter(|(_, st)| st.path == path) {
                for change in &log {
                    let observed = observers.iter().any(|o| {
                        o.store == *id && o.table == change.table && o.key == change.key
                    });
                    if observed && !state.pending.contains(change) {
                        state.pending.push(*change);
                    }
                }
            }
            Ok(())
        })
    }

    fn rollback_write(&self, store: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let group = s.writable_group(store)?;
            if let Some(backup) = group.backup.take() {
                group.data = backup;
            }
            group.writer = None;
            group.write_log.clear();
            Ok(())
        })
    }

    fn is_in_write(&self, store: RawHandle, err: &mut ErrorDescriptor) -> bool {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            Ok(s.group(store)?.writer == Some(store))
        })
    }

    fn refresh(
        &self,
        store: RawHandle,
        sink: &mut dyn FnMut(CorrelationToken, usize),
        err: &mut ErrorDescriptor,
    ) {
        let deliveries: Vec<(CorrelationToken, usize)> = self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let pending = match s.stores.get_mut(&store) {
                Some(state) => std::mem::take(&mut state.pending),
                None => return fail(NativeErrorKind::InvalidHandle, "store was closed"),
            };
            let mut observed: Vec<(CorrelationToken, Observer)> = s
                .observers
                .iter()
                .filter(|(_, o)| o.store == store)
                .map(|(t, o)| (*t, *o))
                .collect();
            observed.sort_by_key(|(t, _)| *t);

            let mut out = Vec::new();
            for change in pending {
                for (token, o) in &observed {
                    if o.table == change.table && o.key == change.key {
                        let delivery = (*token, change.column);
                        if !out.contains(&delivery) {
                            out.push(delivery);
                        }
                    }
                }
            }
            Ok(out)
        });

        // Lock released: sinks may call back into the engine.
        for (token, column) in deliveries {
            sink(token, column);
        }
    }

    // ========================================================================
    // Schema
    // ========================================================================

    fn get_table(&self, store: RawHandle, name: &str, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let position = s.group(store)?.data.tables.iter().position(|t| t.name == name);
            Ok(match position {
                Some(table) => s.issue(Target::Table { store, table }),
                None => RawHandle::NULL,
            })
        })
    }

    fn add_table(&self, store: RawHandle, name: &str, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let group = s.writable_group(store)?;
            if group.data.tables.iter().any(|t| t.name == name) {
                return fail(
                    NativeErrorKind::SchemaViolation,
                    format!("table '{}' already exists", name),
                );
            }
            group.data.tables.push(Table::new(name));
            group.data.schema_version += 1;
            let table = group.data.tables.len() - 1;
            Ok(s.issue(Target::Table { store, table }))
        })
    }

    fn column_count(&self, table: RawHandle, err: &mut ErrorDescriptor) -> usize {
        self.handle_errors(err, |s| Ok(s.table(table)?.2.columns.len()))
    }

    fn column_index(&self, table: RawHandle, name: &str, err: &mut ErrorDescriptor) -> usize {
        self.handle_errors(err, |s| {
            s.stats.column_lookups += 1;
            let (_, _, t) = s.table(table)?;
            Ok(t.columns
                .iter()
                .position(|c| c.name == name)
                .unwrap_or(NOT_FOUND))
        })
    }

    fn column_kind(&self, table: RawHandle, column: usize, err: &mut ErrorDescriptor) -> u8 {
        self.handle_errors(err, |s| Ok(s.table(table)?.2.column(column)?.kind.tag()))
    }

    fn column_nullable(
        &self,
        table: RawHandle,
        column: usize,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.handle_errors(err, |s| Ok(s.table(table)?.2.column(column)?.nullable))
    }

    fn column_link_target(
        &self,
        table: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.handle_errors(err, |s| {
            let (store, _, t) = s.table(table)?;
            let target = t.column(column)?.target;
            let tables = &s.group(store)?.data.tables;
            Ok(match target {
                Some(target) => copy_out(Some(tables[target].name.as_bytes()), buffer, is_null),
                None => copy_out(None, buffer, is_null),
            })
        })
    }

    fn add_column(
        &self,
        table: RawHandle,
        kind: u8,
        name: &str,
        nullable: bool,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.add_column_inner(table, kind, name, nullable, None, err)
    }

    fn add_link_column(
        &self,
        table: RawHandle,
        kind: u8,
        name: &str,
        target: RawHandle,
        err: &mut ErrorDescriptor,
    ) -> usize {
        let nullable = kind == ValueKind::Link.tag();
        self.add_column_inner(table, kind, name, nullable, Some(target), err)
    }

    // ========================================================================
    // Rows
    // ========================================================================

    fn table_size(&self, table: RawHandle, err: &mut ErrorDescriptor) -> usize {
        self.handle_errors(err, |s| Ok(s.table(table)?.2.rows.len()))
    }

    fn add_row(&self, table: RawHandle, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            let (store, table_idx, _) = s.table(table)?;
            let group = s.writable_group(store)?;
            let t = &mut group.data.tables[table_idx];
            let key = t.next_key;
            t.next_key += 1;
            let cells = t.columns.iter().map(Column::default_cell).collect();
            t.rows.push(state::Row { key, cells });
            Ok(s.issue(Target::Row {
                store,
                table: table_idx,
                key,
            }))
        })
    }

    fn row_at(&self, table: RawHandle, index: usize, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            let (store, table_idx, t) = s.table(table)?;
            let key = match t.rows.get(index) {
                Some(row) => row.key,
                None => {
                    return fail(
                        NativeErrorKind::IndexOutOfRange,
                        format!("row {} out of range for '{}' with {} rows", index, t.name, t.rows.len()),
                    )
                }
            };
            Ok(s.issue(Target::Row {
                store,
                table: table_idx,
                key,
            }))
        })
    }

    fn find_row(&self, table: RawHandle, key: u64, err: &mut ErrorDescriptor) -> RawHandle {
        self.handle_errors(err, |s| {
            let (store, table_idx, t) = s.table(table)?;
            if t.row(key).is_none() {
                return Ok(RawHandle::NULL);
            }
            Ok(s.issue(Target::Row {
                store,
                table: table_idx,
                key,
            }))
        })
    }

    fn row_key(&self, row: RawHandle, err: &mut ErrorDescriptor) -> u64 {
        self.handle_errors(err, |s| Ok(s.row_location(row)?.2))
    }

    fn row_is_attached(&self, row: RawHandle, err: &mut ErrorDescriptor) -> bool {
        self.handle_errors(err, |s| match s.row(row) {
            Ok(_) => Ok(true),
            Err((NativeErrorKind::RowDetached, _)) => Ok(false),
            Err(e) => Err(e),
        })
    }

    fn rows_equal(&self, a: RawHandle, b: RawHandle, err: &mut ErrorDescriptor) -> bool {
        self.handle_errors(err, |s| {
            let (store_a, table_a, key_a) = s.row_location(a)?;
            let (store_b, table_b, key_b) = s.row_location(b)?;
            Ok(table_a == table_b && key_a == key_b && s.path(store_a)? == s.path(store_b)?)
        })
    }

    fn remove_row(&self, row: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let (store, table, key) = s.row_location(row)?;
            s.remove_row(store, table, key)
        })
    }

    // ========================================================================
    // Typed column accessors
    // ========================================================================

    fn get_int(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> i64 {
        self.read_fixed(row, column, ValueKind::Int, err, |c| match c {
            Cell::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn get_nullable_int(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut i64,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.read_nullable(row, column, ValueKind::Int, value, err, |c| match c {
            Cell::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn set_int(&self, row: RawHandle, column: usize, value: i64, err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::Int, Cell::Int(value), err)
    }

    fn get_bool(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> bool {
        self.read_fixed(row, column, ValueKind::Bool, err, |c| match c {
            Cell::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn get_nullable_bool(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.read_nullable(row, column, ValueKind::Bool, value, err, |c| match c {
            Cell::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn set_bool(&self, row: RawHandle, column: usize, value: bool, err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::Bool, Cell::Bool(value), err)
    }

    fn get_float(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> f32 {
        self.read_fixed(row, column, ValueKind::Float, err, |c| match c {
            Cell::Float(v) => Some(*v),
            _ => None,
        })
    }

    fn get_nullable_float(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut f32,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.read_nullable(row, column, ValueKind::Float, value, err, |c| match c {
            Cell::Float(v) => Some(*v),
            _ => None,
        })
    }

    fn set_float(&self, row: RawHandle, column: usize, value: f32, err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::Float, Cell::Float(value), err)
    }

    fn get_double(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> f64 {
        self.read_fixed(row, column, ValueKind::Double, err, |c| match c {
            Cell::Double(v) => Some(*v),
            _ => None,
        })
    }

    fn get_nullable_double(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut f64,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.read_nullable(row, column, ValueKind::Double, value, err, |c| match c {
            Cell::Double(v) => Some(*v),
            _ => None,
        })
    }

    fn set_double(&self, row: RawHandle, column: usize, value: f64, err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::Double, Cell::Double(value), err)
    }

    fn get_timestamp(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> i64 {
        self.read_fixed(row, column, ValueKind::Timestamp, err, |c| match c {
            Cell::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn get_nullable_timestamp(
        &self,
        row: RawHandle,
        column: usize,
        seconds: &mut i64,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.read_nullable(row, column, ValueKind::Timestamp, seconds, err, |c| match c {
            Cell::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn set_timestamp(
        &self,
        row: RawHandle,
        column: usize,
        seconds: i64,
        err: &mut ErrorDescriptor,
    ) {
        self.write(row, column, ValueKind::Timestamp, Cell::Int(seconds), err)
    }

    fn set_null(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let (table, _) = s.row(row)?;
            let col = table.column(column)?;
            let (kind, cell) = match col.kind {
                ValueKind::Link => (ValueKind::Link, Cell::Link(None)),
                ValueKind::LinkList => {
                    return fail(NativeErrorKind::TypeMismatch, "link lists cannot be null")
                }
                kind => (kind, Cell::Null),
            };
            s.write_cell(row, column, kind, cell)
        })
    }

    fn get_string(
        &self,
        row: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.read_bytes(row, column, ValueKind::String, buffer, is_null, err)
    }

    fn set_string(&self, row: RawHandle, column: usize, value: &[u8], err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::String, Cell::Bytes(value.to_vec()), err)
    }

    fn get_binary(
        &self,
        row: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.read_bytes(row, column, ValueKind::Binary, buffer, is_null, err)
    }

    fn set_binary(&self, row: RawHandle, column: usize, value: &[u8], err: &mut ErrorDescriptor) {
        self.write(row, column, ValueKind::Binary, Cell::Bytes(value.to_vec()), err)
    }

    fn get_link(
        &self,
        row: RawHandle,
        column: usize,
        target: &mut u64,
        err: &mut ErrorDescriptor,
    ) -> bool {
        self.handle_errors(err, |s| match s.cell(row, column, ValueKind::Link)? {
            Cell::Link(Some(key)) => {
                *target = *key;
                Ok(true)
            }
            Cell::Link(None) => Ok(false),
            _ => fail(NativeErrorKind::Internal, "cell does not match column kind"),
        })
    }

    fn set_link(&self, row: RawHandle, column: usize, target: u64, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let (store, table, _) = s.row_location(row)?;
            s.check_link_target(store, table, column, target)?;
            s.write_cell(row, column, ValueKind::Link, Cell::Link(Some(target)))
        })
    }

    // ========================================================================
    // Link lists
    // ========================================================================

    fn get_linklist(
        &self,
        row: RawHandle,
        column: usize,
        err: &mut ErrorDescriptor,
    ) -> RawHandle {
        self.handle_errors(err, |s| {
            s.cell(row, column, ValueKind::LinkList)?;
            let (store, table, key) = s.row_location(row)?;
            Ok(s.issue(Target::LinkList {
                store,
                table,
                key,
                column,
            }))
        })
    }

    fn linklist_size(&self, list: RawHandle, err: &mut ErrorDescriptor) -> usize {
        self.handle_errors(err, |s| Ok(s.list(list)?.len()))
    }

    fn linklist_add(&self, list: RawHandle, key: u64, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let (store, table, _, column) = s.list_location(list)?;
            s.check_link_target(store, table, column, key)?;
            s.mutate_list(list, |entries| {
                entries.push(key);
                Ok(())
            })
        })
    }

    fn linklist_insert(&self, list: RawHandle, index: usize, key: u64, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let (store, table, _, column) = s.list_location(list)?;
            s.check_link_target(store, table, column, key)?;
            s.mutate_list(list, |entries| {
                if index > entries.len() {
                    return fail(
                        NativeErrorKind::IndexOutOfRange,
                        format!("insert position {} > size {}", index, entries.len()),
                    );
                }
                entries.insert(index, key);
                Ok(())
            })
        })
    }

    fn linklist_erase(&self, list: RawHandle, index: usize, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            s.mutate_list(list, |entries| {
                if index >= entries.len() {
                    return fail(
                        NativeErrorKind::IndexOutOfRange,
                        format!("index {} >= size {}", index, entries.len()),
                    );
                }
                entries.remove(index);
                Ok(())
            })
        })
    }

    fn linklist_clear(&self, list: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            s.mutate_list(list, |entries| {
                entries.clear();
                Ok(())
            })
        })
    }

    fn linklist_get(&self, list: RawHandle, index: usize, err: &mut ErrorDescriptor) -> u64 {
        self.handle_errors(err, |s| {
            let entries = s.list(list)?;
            match entries.get(index) {
                Some(key) => Ok(*key),
                None => fail(
                    NativeErrorKind::IndexOutOfRange,
                    format!("index {} >= size {}", index, entries.len()),
                ),
            }
        })
    }

    fn linklist_find(
        &self,
        list: RawHandle,
        key: u64,
        start: usize,
        err: &mut ErrorDescriptor,
    ) -> usize {
        self.handle_errors(err, |s| {
            let entries = s.list(list)?;
            Ok(entries
                .iter()
                .enumerate()
                .skip(start)
                .find(|(_, k)| **k == key)
                .map(|(i, _)| i)
                .unwrap_or(NOT_FOUND))
        })
    }

    // ========================================================================
    // Change observation
    // ========================================================================

    fn add_observed_object(
        &self,
        store: RawHandle,
        row: RawHandle,
        token: CorrelationToken,
        err: &mut ErrorDescriptor,
    ) {
        self.handle_errors(err, |s| {
            let store = s.store_id(store)?;
            let (row_store, table, key) = s.row_location(row)?;
            if s.path(row_store)? != s.path(store)? {
                return fail(
                    NativeErrorKind::InvalidHandle,
                    "row does not belong to the observing store",
                );
            }
            if s.observers.contains_key(&token) {
                return fail(
                    NativeErrorKind::Internal,
                    format!("{} is already registered", token),
                );
            }
            s.observers.insert(token, Observer { store, table, key });
            s.stats.observers_added += 1;
            Ok(())
        })
    }

    fn remove_observed_object(&self, token: CorrelationToken, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            s.stats.observers_removed += 1;
            s.observers.remove(&token);
            Ok(())
        })
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn destroy(&self, kind: HandleKind, handle: RawHandle, err: &mut ErrorDescriptor) {
        self.handle_errors(err, |s| {
            let raw = handle.as_raw();
            match s.handles.get(&raw) {
                None => return Ok(()),
                Some(target) if target.kind() != kind => {
                    return fail(
                        NativeErrorKind::InvalidHandle,
                        format!("cannot destroy {} handle {} as {}", target.kind(), handle, kind),
                    )
                }
                Some(_) => {}
            }
            s.handles.remove(&raw);
            s.stats.handles_destroyed += 1;

            if kind == HandleKind::Store {
                if let Ok(group) = s.group_mut(raw) {
                    if group.writer == Some(raw) {
                        if let Some(backup) = group.backup.take() {
                            group.data = backup;
                        }
                        group.writer = None;
                        group.write_log.clear();
                    }
                }
                s.observers.retain(|_, o| o.store != raw);
                s.stores.remove(&raw);
                debug!(target: "tether::engine", store = %handle, "Store destroyed");
            }
            Ok(())
        })
    }
}
