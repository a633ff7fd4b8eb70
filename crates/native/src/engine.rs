//! Native engine interface
//!
//! This module defines the `NativeEngine` trait: the function surface the
//! binding layer consumes from the persistence engine. The surface is shaped
//! like the engine's exported C functions:
//!
//! - Resources are addressed through opaque [`RawHandle`]s and released with
//!   [`NativeEngine::destroy`].
//! - Every fallible call fills an out-parameter [`ErrorDescriptor`]. When the
//!   descriptor is set, the nominal return value is undefined.
//! - Lookups that find nothing return [`NOT_FOUND`](tether_core::NOT_FOUND) or
//!   [`RawHandle::NULL`].
//! - Variable-length reads copy into a caller-supplied buffer and return the
//!   number of bytes the full value needs, with nullness in a separate flag.
//!
//! # Architecture
//!
//! ```text
//! Property access:
//!   Facade → Metadata → Accessor → Handle → Marshal → NativeEngine
//!
//! Change notification:
//!   NativeEngine::refresh → sink(token, column) → Bridge → Facade subscribers
//! ```
//!
//! The engine owns storage, transactions and schema. Nothing behind this trait
//! is reproduced by the binding layer.

use tether_core::{CorrelationToken, ErrorDescriptor, HandleKind, RawHandle};

/// Functions consumed from the native persistence engine
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the binding layer itself confines
/// each opened store to one thread.
///
/// # Write transactions
///
/// Every mutating call (`set_*`, `add_row`, `remove_row`, `linklist_*`
/// mutators, `add_table`, `add_column`, `add_link_column`) fails with
/// `NotInWriteTransaction` unless the store owning the handle has an open
/// write transaction.
pub trait NativeEngine: Send + Sync {
    // ========================================================================
    // Store lifecycle
    // ========================================================================

    /// Open a store on `path`. Stores opened on the same path share data.
    fn open_store(&self, path: &str, err: &mut ErrorDescriptor) -> RawHandle;

    /// Current schema version of the store's data
    fn schema_version(&self, store: RawHandle, err: &mut ErrorDescriptor) -> u64;

    /// Begin a write transaction. Fails with `WriteTransactionActive` while any
    /// store on the same path holds one.
    fn begin_write(&self, store: RawHandle, err: &mut ErrorDescriptor);

    /// Commit the open write transaction and queue change notifications for
    /// every store on the same path.
    fn commit_write(&self, store: RawHandle, err: &mut ErrorDescriptor);

    /// Discard the open write transaction
    fn rollback_write(&self, store: RawHandle, err: &mut ErrorDescriptor);

    /// Whether the store has an open write transaction
    fn is_in_write(&self, store: RawHandle, err: &mut ErrorDescriptor) -> bool;

    /// Deliver queued change notifications for observed rows of this store.
    ///
    /// `sink` is invoked synchronously once per `(token, changed column)`.
    /// Implementations must not hold internal locks while calling `sink`.
    fn refresh(
        &self,
        store: RawHandle,
        sink: &mut dyn FnMut(CorrelationToken, usize),
        err: &mut ErrorDescriptor,
    );

    // ========================================================================
    // Schema
    // ========================================================================

    /// Look up a table by name; `RawHandle::NULL` if it does not exist
    fn get_table(&self, store: RawHandle, name: &str, err: &mut ErrorDescriptor) -> RawHandle;

    /// Create a table
    fn add_table(&self, store: RawHandle, name: &str, err: &mut ErrorDescriptor) -> RawHandle;

    /// Number of columns in the table
    fn column_count(&self, table: RawHandle, err: &mut ErrorDescriptor) -> usize;

    /// Column position by name, `NOT_FOUND` if absent
    fn column_index(&self, table: RawHandle, name: &str, err: &mut ErrorDescriptor) -> usize;

    /// Native type code of the column
    fn column_kind(&self, table: RawHandle, column: usize, err: &mut ErrorDescriptor) -> u8;

    /// Whether the column admits null
    fn column_nullable(&self, table: RawHandle, column: usize, err: &mut ErrorDescriptor)
        -> bool;

    /// Name of the link target table, through the variable-length protocol.
    /// `is_null` is set for non-link columns.
    fn column_link_target(
        &self,
        table: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize;

    /// Append a scalar column; returns its position
    fn add_column(
        &self,
        table: RawHandle,
        kind: u8,
        name: &str,
        nullable: bool,
        err: &mut ErrorDescriptor,
    ) -> usize;

    /// Append a link or link-list column targeting another table
    fn add_link_column(
        &self,
        table: RawHandle,
        kind: u8,
        name: &str,
        target: RawHandle,
        err: &mut ErrorDescriptor,
    ) -> usize;

    // ========================================================================
    // Rows
    // ========================================================================

    /// Number of rows in the table
    fn table_size(&self, table: RawHandle, err: &mut ErrorDescriptor) -> usize;

    /// Append a row with default values; returns a new row handle
    fn add_row(&self, table: RawHandle, err: &mut ErrorDescriptor) -> RawHandle;

    /// Row handle for the row at `index`
    fn row_at(&self, table: RawHandle, index: usize, err: &mut ErrorDescriptor) -> RawHandle;

    /// Row handle for the row with `key`; `RawHandle::NULL` if absent
    fn find_row(&self, table: RawHandle, key: u64, err: &mut ErrorDescriptor) -> RawHandle;

    /// Stable key of the row
    fn row_key(&self, row: RawHandle, err: &mut ErrorDescriptor) -> u64;

    /// Whether the row still exists
    fn row_is_attached(&self, row: RawHandle, err: &mut ErrorDescriptor) -> bool;

    /// Whether two row handles refer to the same native row
    fn rows_equal(&self, a: RawHandle, b: RawHandle, err: &mut ErrorDescriptor) -> bool;

    /// Delete the row, nullifying links that target it
    fn remove_row(&self, row: RawHandle, err: &mut ErrorDescriptor);

    // ========================================================================
    // Typed column accessors
    // ========================================================================

    /// Read a non-nullable integer
    fn get_int(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> i64;
    /// Read a nullable integer; returns false for null
    fn get_nullable_int(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut i64,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Write an integer
    fn set_int(&self, row: RawHandle, column: usize, value: i64, err: &mut ErrorDescriptor);

    /// Read a non-nullable bool
    fn get_bool(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> bool;
    /// Read a nullable bool; returns false for null
    fn get_nullable_bool(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Write a bool
    fn set_bool(&self, row: RawHandle, column: usize, value: bool, err: &mut ErrorDescriptor);

    /// Read a non-nullable float
    fn get_float(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> f32;
    /// Read a nullable float; returns false for null
    fn get_nullable_float(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut f32,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Write a float
    fn set_float(&self, row: RawHandle, column: usize, value: f32, err: &mut ErrorDescriptor);

    /// Read a non-nullable double
    fn get_double(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> f64;
    /// Read a nullable double; returns false for null
    fn get_nullable_double(
        &self,
        row: RawHandle,
        column: usize,
        value: &mut f64,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Write a double
    fn set_double(&self, row: RawHandle, column: usize, value: f64, err: &mut ErrorDescriptor);

    /// Read a non-nullable timestamp (seconds since epoch)
    fn get_timestamp(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor) -> i64;
    /// Read a nullable timestamp; returns false for null
    fn get_nullable_timestamp(
        &self,
        row: RawHandle,
        column: usize,
        seconds: &mut i64,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Write a timestamp (seconds since epoch)
    fn set_timestamp(
        &self,
        row: RawHandle,
        column: usize,
        seconds: i64,
        err: &mut ErrorDescriptor,
    );

    /// Write null into a nullable column or clear a link
    fn set_null(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor);

    /// Read a string into `buffer`; returns the byte length of the full value
    fn get_string(
        &self,
        row: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize;
    /// Write string bytes
    fn set_string(&self, row: RawHandle, column: usize, value: &[u8], err: &mut ErrorDescriptor);

    /// Read a blob into `buffer`; returns the byte length of the full value
    fn get_binary(
        &self,
        row: RawHandle,
        column: usize,
        buffer: &mut [u8],
        is_null: &mut bool,
        err: &mut ErrorDescriptor,
    ) -> usize;
    /// Write blob bytes
    fn set_binary(&self, row: RawHandle, column: usize, value: &[u8], err: &mut ErrorDescriptor);

    /// Read a link; returns false for a null link
    fn get_link(
        &self,
        row: RawHandle,
        column: usize,
        target: &mut u64,
        err: &mut ErrorDescriptor,
    ) -> bool;
    /// Point a link at the row with key `target` in the link target table
    fn set_link(&self, row: RawHandle, column: usize, target: u64, err: &mut ErrorDescriptor);

    // ========================================================================
    // Link lists
    // ========================================================================

    /// Handle to the link list stored in `column` of `row`
    fn get_linklist(&self, row: RawHandle, column: usize, err: &mut ErrorDescriptor)
        -> RawHandle;
    /// Number of entries
    fn linklist_size(&self, list: RawHandle, err: &mut ErrorDescriptor) -> usize;
    /// Append a link to the row with `key`
    fn linklist_add(&self, list: RawHandle, key: u64, err: &mut ErrorDescriptor);
    /// Insert a link at `index`
    fn linklist_insert(&self, list: RawHandle, index: usize, key: u64, err: &mut ErrorDescriptor);
    /// Remove the entry at `index`
    fn linklist_erase(&self, list: RawHandle, index: usize, err: &mut ErrorDescriptor);
    /// Remove all entries
    fn linklist_clear(&self, list: RawHandle, err: &mut ErrorDescriptor);
    /// Key of the row linked at `index`
    fn linklist_get(&self, list: RawHandle, index: usize, err: &mut ErrorDescriptor) -> u64;
    /// First position at or after `start` linking `key`, `NOT_FOUND` if none
    fn linklist_find(
        &self,
        list: RawHandle,
        key: u64,
        start: usize,
        err: &mut ErrorDescriptor,
    ) -> usize;

    // ========================================================================
    // Change observation
    // ========================================================================

    /// Start observing `row`; changes are delivered to `token` on refresh
    fn add_observed_object(
        &self,
        store: RawHandle,
        row: RawHandle,
        token: CorrelationToken,
        err: &mut ErrorDescriptor,
    );

    /// Stop observing for `token`, dropping any undelivered changes for it
    fn remove_observed_object(&self, token: CorrelationToken, err: &mut ErrorDescriptor);

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release a handle. Destroying an unknown or already destroyed handle is a no-op.
    fn destroy(&self, kind: HandleKind, handle: RawHandle, err: &mut ErrorDescriptor);
}
