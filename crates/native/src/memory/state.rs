//! Data model and bookkeeping of the in-memory engine
//!
//! All state lives behind one mutex in [`InMemoryEngine`](super::InMemoryEngine).
//! Methods here return `NativeResult` and are translated into error
//! descriptors at the trait boundary.

use rustc_hash::FxHashMap;
use tether_core::{CorrelationToken, HandleKind, NativeErrorKind, RawHandle, ValueKind};

pub(crate) type NativeResult<T> = Result<T, (NativeErrorKind, String)>;

pub(crate) fn fail<T>(kind: NativeErrorKind, message: impl Into<String>) -> NativeResult<T> {
    Err((kind, message.into()))
}

// ============================================================================
// Tables and rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Link(Option<u64>),
    List(Vec<u64>),
}

#[derive(Debug, Clone)]
pub(crate) struct Column {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub target: Option<usize>,
}

impl Column {
    pub fn default_cell(&self) -> Cell {
        match self.kind {
            ValueKind::Link => Cell::Link(None),
            ValueKind::LinkList => Cell::List(Vec::new()),
            _ if self.nullable => Cell::Null,
            ValueKind::Int | ValueKind::Timestamp => Cell::Int(0),
            ValueKind::Bool => Cell::Bool(false),
            ValueKind::Float => Cell::Float(0.0),
            ValueKind::Double => Cell::Double(0.0),
            ValueKind::String | ValueKind::Binary => Cell::Bytes(Vec::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub key: u64,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub next_key: u64,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            next_key: 1,
        }
    }

    pub fn position(&self, key: u64) -> Option<usize> {
        self.rows.iter().position(|row| row.key == key)
    }

    pub fn row(&self, key: u64) -> Option<&Row> {
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn row_mut(&mut self, key: u64) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.key == key)
    }

    pub fn column(&self, column: usize) -> NativeResult<&Column> {
        match self.columns.get(column) {
            Some(col) => Ok(col),
            None => fail(
                NativeErrorKind::IndexOutOfRange,
                format!(
                    "column {} out of range for table '{}' with {} columns",
                    column,
                    self.name,
                    self.columns.len()
                ),
            ),
        }
    }
}

// ============================================================================
// Groups (shared data per path)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupData {
    pub schema_version: u64,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Change {
    pub table: usize,
    pub key: u64,
    pub column: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Group {
    pub data: GroupData,
    /// Copy of `data` taken at `begin_write`, restored on rollback
    pub backup: Option<GroupData>,
    /// Store holding the write transaction
    pub writer: Option<u64>,
    pub write_log: Vec<Change>,
}

// ============================================================================
// Handles, stores, observers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Store,
    Table {
        store: u64,
        table: usize,
    },
    Row {
        store: u64,
        table: usize,
        key: u64,
    },
    LinkList {
        store: u64,
        table: usize,
        key: u64,
        column: usize,
    },
}

impl Target {
    pub fn kind(&self) -> HandleKind {
        match self {
            Target::Store => HandleKind::Store,
            Target::Table { .. } => HandleKind::Table,
            Target::Row { .. } => HandleKind::Row,
            Target::LinkList { .. } => HandleKind::LinkList,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StoreState {
    pub path: String,
    pub pending: Vec<Change>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Observer {
    pub store: u64,
    pub table: usize,
    pub key: u64,
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Calls to `column_index`
    pub column_lookups: u64,
    /// Successful `add_observed_object` calls
    pub observers_added: u64,
    /// Calls to `remove_observed_object`, including ones for unknown tokens
    pub observers_removed: u64,
    /// `destroy` calls that released a live handle
    pub handles_destroyed: u64,
    /// Handles currently issued
    pub live_handles: usize,
    /// Registrations currently active
    pub live_observers: usize,
    /// Changes queued for delivery across all stores
    pub pending_changes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    next_handle: u64,
    pub handles: FxHashMap<u64, Target>,
    pub stores: FxHashMap<u64, StoreState>,
    pub groups: FxHashMap<String, Group>,
    pub observers: FxHashMap<CorrelationToken, Observer>,
    pub stats: EngineStats,
}

impl EngineState {
    pub fn issue(&mut self, target: Target) -> RawHandle {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.handles.insert(raw, target);
        RawHandle::from_raw(raw)
    }

    pub fn resolve(&self, handle: RawHandle, kind: HandleKind) -> NativeResult<Target> {
        match self.handles.get(&handle.as_raw()) {
            Some(target) if target.kind() == kind => Ok(*target),
            Some(target) => fail(
                NativeErrorKind::InvalidHandle,
                format!("expected {} handle, {} is a {} handle", kind, handle, target.kind()),
            ),
            None => fail(
                NativeErrorKind::InvalidHandle,
                format!("unknown {} handle {}", kind, handle),
            ),
        }
    }

    pub fn store_id(&self, store: RawHandle) -> NativeResult<u64> {
        self.resolve(store, HandleKind::Store)?;
        Ok(store.as_raw())
    }

    pub fn path(&self, store: u64) -> NativeResult<&str> {
        match self.stores.get(&store) {
            Some(state) => Ok(&state.path),
            None => fail(NativeErrorKind::InvalidHandle, "store was closed"),
        }
    }

    pub fn group(&self, store: u64) -> NativeResult<&Group> {
        let path = self.path(store)?;
        match self.groups.get(path) {
            Some(group) => Ok(group),
            None => fail(NativeErrorKind::Internal, format!("no data for path '{}'", path)),
        }
    }

    pub fn group_mut(&mut self, store: u64) -> NativeResult<&mut Group> {
        let EngineState { stores, groups, .. } = self;
        let path = match stores.get(&store) {
            Some(state) => &state.path,
            None => return fail(NativeErrorKind::InvalidHandle, "store was closed"),
        };
        match groups.get_mut(path) {
            Some(group) => Ok(group),
            None => fail(NativeErrorKind::Internal, format!("no data for path '{}'", path)),
        }
    }

    /// Group of `store`, checked to have an open write transaction owned by it
    pub fn writable_group(&mut self, store: u64) -> NativeResult<&mut Group> {
        let group = self.group_mut(store)?;
        if group.writer != Some(store) {
            return fail(
                NativeErrorKind::NotInWriteTransaction,
                "mutation requires an open write transaction",
            );
        }
        Ok(group)
    }

    pub fn table(&self, handle: RawHandle) -> NativeResult<(u64, usize, &Table)> {
        let (store, table) = match self.resolve(handle, HandleKind::Table)? {
            Target::Table { store, table } => (store, table),
            _ => return fail(NativeErrorKind::Internal, "handle kind mismatch"),
        };
        let group = self.group(store)?;
        match group.data.tables.get(table) {
            Some(t) => Ok((store, table, t)),
            None => fail(NativeErrorKind::InvalidHandle, "table no longer exists"),
        }
    }

    pub fn row_location(&self, handle: RawHandle) -> NativeResult<(u64, usize, u64)> {
        match self.resolve(handle, HandleKind::Row)? {
            Target::Row { store, table, key } => Ok((store, table, key)),
            _ => fail(NativeErrorKind::Internal, "handle kind mismatch"),
        }
    }

    pub fn row(&self, handle: RawHandle) -> NativeResult<(&Table, &Row)> {
        let (store, table, key) = self.row_location(handle)?;
        let table = match self.group(store)?.data.tables.get(table) {
            Some(t) => t,
            None => return fail(NativeErrorKind::InvalidHandle, "table no longer exists"),
        };
        match table.row(key) {
            Some(row) => Ok((table, row)),
            None => fail(
                NativeErrorKind::RowDetached,
                format!("row {} of '{}' was deleted", key, table.name),
            ),
        }
    }

    /// Cell of `row` in `column`, checking the column kind
    pub fn cell(&self, row: RawHandle, column: usize, kind: ValueKind) -> NativeResult<&Cell> {
        let (table, r) = self.row(row)?;
        let col = table.column(column)?;
        if col.kind != kind {
            return fail(
                NativeErrorKind::TypeMismatch,
                format!(
                    "column '{}' holds {} values, accessed as {}",
                    col.name, col.kind, kind
                ),
            );
        }
        Ok(&r.cells[column])
    }

    /// Replace the cell of `row` in `column` and log the change
    pub fn write_cell(
        &mut self,
        row: RawHandle,
        column: usize,
        kind: ValueKind,
        value: Cell,
    ) -> NativeResult<()> {
        let (store, table_idx, key) = self.row_location(row)?;
        let group = self.writable_group(store)?;
        let table = match group.data.tables.get_mut(table_idx) {
            Some(t) => t,
            None => return fail(NativeErrorKind::InvalidHandle, "table no longer exists"),
        };
        let col = table.column(column)?;
        if col.kind != kind {
            return fail(
                NativeErrorKind::TypeMismatch,
                format!(
                    "column '{}' holds {} values, written as {}",
                    col.name, col.kind, kind
                ),
            );
        }
        if value == Cell::Null && !col.nullable {
            return fail(
                NativeErrorKind::TypeMismatch,
                format!("column '{}' is not nullable", col.name),
            );
        }
        let name = table.name.clone();
        match table.row_mut(key) {
            Some(r) => r.cells[column] = value,
            None => {
                return fail(
                    NativeErrorKind::RowDetached,
                    format!("row {} of '{}' was deleted", key, name),
                )
            }
        }
        group.write_log.push(Change {
            table: table_idx,
            key,
            column,
        });
        Ok(())
    }

    /// Target table of a link column, checked to contain `key`
    pub fn check_link_target(
        &self,
        store: u64,
        table: usize,
        column: usize,
        key: u64,
    ) -> NativeResult<()> {
        let tables = &self.group(store)?.data.tables;
        let col = tables[table].column(column)?;
        let target = match col.target {
            Some(target) => &tables[target],
            None => {
                return fail(
                    NativeErrorKind::TypeMismatch,
                    format!("column '{}' is not a link column", col.name),
                )
            }
        };
        if target.row(key).is_none() {
            return fail(
                NativeErrorKind::RowDetached,
                format!("link target {} does not exist in '{}'", key, target.name),
            );
        }
        Ok(())
    }

    pub fn list_location(&self, list: RawHandle) -> NativeResult<(u64, usize, u64, usize)> {
        match self.resolve(list, HandleKind::LinkList)? {
            Target::LinkList {
                store,
                table,
                key,
                column,
            } => Ok((store, table, key, column)),
            _ => fail(NativeErrorKind::Internal, "handle kind mismatch"),
        }
    }

    pub fn list(&self, list: RawHandle) -> NativeResult<&Vec<u64>> {
        let (store, table, key, column) = self.list_location(list)?;
        let table = &self.group(store)?.data.tables[table];
        match table.row(key).map(|r| &r.cells[column]) {
            Some(Cell::List(entries)) => Ok(entries),
            Some(_) => fail(NativeErrorKind::TypeMismatch, "column is not a link list"),
            None => fail(
                NativeErrorKind::RowDetached,
                format!("owner row {} of '{}' was deleted", key, table.name),
            ),
        }
    }

    /// Apply `f` to the entries of a link list inside the open write transaction
    pub fn mutate_list<T>(
        &mut self,
        list: RawHandle,
        f: impl FnOnce(&mut Vec<u64>) -> NativeResult<T>,
    ) -> NativeResult<T> {
        let (store, table_idx, key, column) = self.list_location(list)?;
        let group = self.writable_group(store)?;
        let table = &mut group.data.tables[table_idx];
        let name = table.name.clone();
        let entries = match table.row_mut(key).map(|r| &mut r.cells[column]) {
            Some(Cell::List(entries)) => entries,
            Some(_) => return fail(NativeErrorKind::TypeMismatch, "column is not a link list"),
            None => {
                return fail(
                    NativeErrorKind::RowDetached,
                    format!("owner row {} of '{}' was deleted", key, name),
                )
            }
        };
        let result = f(entries)?;
        group.write_log.push(Change {
            table: table_idx,
            key,
            column,
        });
        Ok(result)
    }

    /// Remove a row and strip every link pointing at it
    pub fn remove_row(&mut self, store: u64, table_idx: usize, key: u64) -> NativeResult<()> {
        let group = self.writable_group(store)?;
        let tables = &mut group.data.tables;
        let position = match tables[table_idx].position(key) {
            Some(p) => p,
            None => {
                return fail(
                    NativeErrorKind::RowDetached,
                    format!("row {} of '{}' was deleted", key, tables[table_idx].name),
                )
            }
        };
        tables[table_idx].rows.remove(position);

        let mut log = Vec::new();
        for (t, table) in tables.iter_mut().enumerate() {
            let link_columns: Vec<usize> = table
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.target == Some(table_idx))
                .map(|(i, _)| i)
                .collect();
            for row in table.rows.iter_mut() {
                for &c in &link_columns {
                    let changed = match &mut row.cells[c] {
                        Cell::Link(link) if *link == Some(key) => {
                            *link = None;
                            true
                        }
                        Cell::List(entries) => {
                            let before = entries.len();
                            entries.retain(|&k| k != key);
                            entries.len() != before
                        }
                        _ => false,
                    };
                    if changed {
                        log.push(Change {
                            table: t,
                            key: row.key,
                            column: c,
                        });
                    }
                }
            }
        }
        group.write_log.extend(log);
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            live_handles: self.handles.len(),
            live_observers: self.observers.len(),
            pending_changes: self.stores.values().map(|st| st.pending.len()).sum(),
            ..self.stats
        }
    }
}
