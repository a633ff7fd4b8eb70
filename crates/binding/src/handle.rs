//! Native handle ownership
//!
//! A [`NativeHandle`] owns one native resource and releases it exactly once.
//! Handles form a tree that mirrors resource dependencies:
//!
//! ```text
//! store
//!  └── table
//!       └── row
//!            └── link list
//! ```
//!
//! ## Invariants
//!
//! - A child holds a strong reference to its parent, so a parent's native
//!   resource is never destroyed by `Drop` while a child is alive.
//! - An explicit [`NativeHandle::release`] cascades: children are released
//!   first, then the handle itself.
//! - Every native call goes through [`NativeHandle::call`] or
//!   [`NativeHandle::with_raw`], which fail with
//!   [`Error::InvalidatedHandle`] once the handle or an ancestor is released.
//!
//! Handles are `!Send`: a store and everything below it stay on the thread
//! that opened the store.

use crate::marshal;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tether_core::{Error, ErrorDescriptor, HandleKind, RawHandle, Result};
use tether_native::NativeEngine;
use tracing::{debug, warn};

struct HandleInner {
    kind: HandleKind,
    raw: RawHandle,
    released: Cell<bool>,
    parent: Option<NativeHandle>,
    children: RefCell<Vec<Weak<HandleInner>>>,
    engine: Arc<dyn NativeEngine>,
}

impl HandleInner {
    fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }

        let children = std::mem::take(&mut *self.children.borrow_mut());
        let mut first_error = None;
        for child in children.iter().filter_map(Weak::upgrade) {
            if let Err(e) = child.release() {
                first_error.get_or_insert(e);
            }
        }

        let destroyed = marshal::call(|err| self.engine.destroy(self.kind, self.raw, err));
        debug!(target: "tether::handle", kind = %self.kind, raw = %self.raw, "Handle released");
        match (destroyed, first_error) {
            (Err(e), _) | (Ok(()), Some(e)) => Err(e),
            (Ok(()), None) => Ok(()),
        }
    }

    fn is_valid(&self) -> bool {
        !self.released.get() && self.parent.as_ref().map_or(true, NativeHandle::is_valid)
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(target: "tether::handle", kind = %self.kind, raw = %self.raw, error = %e, "Failed to release handle on drop");
        }
    }
}

/// Owning reference to a native resource
///
/// Cloning shares ownership of the same resource; the resource is destroyed
/// when the last clone drops or on the first explicit `release`.
#[derive(Clone)]
pub struct NativeHandle {
    inner: Rc<HandleInner>,
}

impl NativeHandle {
    /// Open a root handle.
    ///
    /// `factory` runs against the engine and returns the raw handle.
    ///
    /// # Errors
    ///
    /// Native failures are returned as [`Error::NativeEngine`]; a null handle
    /// from a successful call is [`Error::CorruptedData`].
    pub fn open(
        engine: Arc<dyn NativeEngine>,
        kind: HandleKind,
        factory: impl FnOnce(&dyn NativeEngine, &mut ErrorDescriptor) -> RawHandle,
    ) -> Result<Self> {
        let raw = marshal::call(|err| factory(engine.as_ref(), err))?;
        match marshal::optional_handle(raw) {
            Some(raw) => Ok(Self::wrap(engine, kind, raw, None)),
            None => Err(Error::corrupted(format!(
                "engine returned a null {} handle without an error",
                kind
            ))),
        }
    }

    /// Acquire a child handle whose lifetime is bounded by `self`.
    ///
    /// `factory` receives the parent's raw handle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidatedHandle`] if `self` is no longer valid, native
    /// failures, and [`Error::CorruptedData`] for a null result.
    pub fn acquire(
        &self,
        kind: HandleKind,
        factory: impl FnOnce(&dyn NativeEngine, RawHandle, &mut ErrorDescriptor) -> RawHandle,
    ) -> Result<Self> {
        match self.acquire_optional(kind, factory)? {
            Some(handle) => Ok(handle),
            None => Err(Error::corrupted(format!(
                "engine returned a null {} handle without an error",
                kind
            ))),
        }
    }

    /// Acquire a child handle from a lookup that may find nothing.
    ///
    /// Returns `None` when the native lookup returned the null handle.
    pub fn acquire_optional(
        &self,
        kind: HandleKind,
        factory: impl FnOnce(&dyn NativeEngine, RawHandle, &mut ErrorDescriptor) -> RawHandle,
    ) -> Result<Option<Self>> {
        let raw = self.call(factory)?;
        let raw = match marshal::optional_handle(raw) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let child = Self::wrap(self.inner.engine.clone(), kind, raw, Some(self.clone()));
        let mut children = self.inner.children.borrow_mut();
        children.retain(|c| c.strong_count() > 0);
        children.push(Rc::downgrade(&child.inner));
        Ok(Some(child))
    }

    fn wrap(
        engine: Arc<dyn NativeEngine>,
        kind: HandleKind,
        raw: RawHandle,
        parent: Option<NativeHandle>,
    ) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                kind,
                raw,
                released: Cell::new(false),
                parent,
                children: RefCell::new(Vec::new()),
                engine,
            }),
        }
    }

    /// Release the native resource and every descendant.
    ///
    /// Idempotent: later calls return `Ok(())` without touching the engine.
    pub fn release(&self) -> Result<()> {
        self.inner.release()
    }

    /// False once this handle or any ancestor has been released
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// Kind of resource behind this handle
    pub fn kind(&self) -> HandleKind {
        self.inner.kind
    }

    /// Parent handle, `None` for a root
    pub fn parent(&self) -> Option<&NativeHandle> {
        self.inner.parent.as_ref()
    }

    /// Engine that issued this handle
    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.inner.engine
    }

    /// Run `f` with the raw handle after checking validity.
    pub fn with_raw<T>(
        &self,
        f: impl FnOnce(&dyn NativeEngine, RawHandle) -> Result<T>,
    ) -> Result<T> {
        if !self.is_valid() {
            return Err(Error::InvalidatedHandle {
                kind: self.inner.kind,
            });
        }
        f(self.inner.engine.as_ref(), self.inner.raw)
    }

    /// Invoke a native function on this handle and translate its error descriptor.
    pub fn call<T>(
        &self,
        f: impl FnOnce(&dyn NativeEngine, RawHandle, &mut ErrorDescriptor) -> T,
    ) -> Result<T> {
        self.with_raw(|engine, raw| marshal::call(|err| f(engine, raw, err)))
    }

    /// Whether two handles share ownership of the same resource
    pub fn ptr_eq(&self, other: &NativeHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &self.inner.kind)
            .field("raw", &self.inner.raw)
            .field("valid", &self.is_valid())
            .finish()
    }
}
