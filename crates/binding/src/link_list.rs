//! Ordered to-many relationships
//!
//! A [`LinkList`] wraps a native link-list handle owned by a row. Entries are
//! row keys of the target table; reads resolve them back into facades of the
//! same store. Every index is checked against the current size before the
//! native call.

use crate::handle::NativeHandle;
use crate::marshal;
use crate::object::Persistable;
use crate::store::StoreInner;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tether_core::{Error, Result, RowKey};

/// Live list of links to `T` objects
pub struct LinkList<T: Persistable> {
    handle: NativeHandle,
    store: Rc<StoreInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persistable> LinkList<T> {
    pub(crate) fn new(handle: NativeHandle, store: Rc<StoreInner>) -> Self {
        Self {
            handle,
            store,
            _marker: PhantomData,
        }
    }

    /// Number of entries
    pub fn len(&self) -> Result<usize> {
        self.handle.call(|e, raw, err| e.linklist_size(raw, err))
    }

    /// True when the list has no entries
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn check_index(&self, index: usize) -> Result<usize> {
        let size = self.len()?;
        if index >= size {
            return Err(Error::OutOfRange { index, size });
        }
        Ok(size)
    }

    fn member_key(&self, target: &Rc<T>, operation: &str) -> Result<RowKey> {
        target.core().row_key_in(&self.store, operation)
    }

    /// Key of the row linked at `index`
    pub fn key_at(&self, index: usize) -> Result<RowKey> {
        self.check_index(index)?;
        self.handle
            .call(|e, raw, err| e.linklist_get(raw, index, err))
            .map(RowKey::new)
    }

    /// Object linked at `index`
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<Rc<T>> {
        let key = self.key_at(index)?;
        self.store.find::<T>(key)?.ok_or_else(|| {
            Error::corrupted(format!("link list entry {} points at missing row {}", index, key))
        })
    }

    /// Append a link to `target`
    ///
    /// # Errors
    ///
    /// [`Error::NotInWriteScope`] outside a write scope; [`Error::NotManaged`]
    /// if `target` is unmanaged or owned by another store.
    pub fn add(&self, target: &Rc<T>) -> Result<()> {
        self.store.require_write()?;
        let key = self.member_key(target, "add to a link list")?;
        self.handle
            .call(|e, raw, err| e.linklist_add(raw, key.get(), err))
    }

    /// Insert a link at `index`; `index == len()` appends
    pub fn insert(&self, index: usize, target: &Rc<T>) -> Result<()> {
        self.store.require_write()?;
        let size = self.len()?;
        if index > size {
            return Err(Error::OutOfRange { index, size });
        }
        let key = self.member_key(target, "insert into a link list")?;
        self.handle
            .call(|e, raw, err| e.linklist_insert(raw, index, key.get(), err))
    }

    /// Remove the entry at `index`. The linked row itself is kept.
    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.store.require_write()?;
        self.check_index(index)?;
        self.handle
            .call(|e, raw, err| e.linklist_erase(raw, index, err))
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.store.require_write()?;
        self.handle.call(|e, raw, err| e.linklist_clear(raw, err))
    }

    /// First position at or after `start` linking `target`
    ///
    /// Unmanaged objects and objects of other stores are never found.
    pub fn find(&self, target: &Rc<T>, start: usize) -> Result<Option<usize>> {
        let size = self.len()?;
        if start > size {
            return Err(Error::OutOfRange { index: start, size });
        }
        let key = match target.core().store() {
            Some(store) if Rc::ptr_eq(store, &self.store) => target.row_key()?,
            _ => return Ok(None),
        };
        self.handle
            .call(|e, raw, err| e.linklist_find(raw, key.get(), start, err))
            .map(marshal::optional_index)
    }

    /// Whether `target` is linked anywhere in the list
    pub fn contains(&self, target: &Rc<T>) -> Result<bool> {
        Ok(self.find(target, 0)?.is_some())
    }

    /// All linked objects in order
    pub fn to_vec(&self) -> Result<Vec<Rc<T>>> {
        (0..self.len()?).map(|i| self.get(i)).collect()
    }

    /// Whether the underlying native list is still reachable
    pub fn is_valid(&self) -> bool {
        !self.store.is_closed() && self.handle.is_valid()
    }
}

impl<T: Persistable> fmt::Debug for LinkList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkList")
            .field("target", &T::TABLE)
            .field("handle", &self.handle)
            .finish()
    }
}
