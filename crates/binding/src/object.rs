//! Object facade
//!
//! User types implement [`Persistable`] and embed an [`ObjectCore`], which
//! carries the binding state of one object:
//!
//! - **Unmanaged**: no handle, no metadata, no store. Typed property access
//!   fails with [`Error::NotManaged`]; the type's own fields hold its values
//!   until [`Persistable::copy_to`] writes them into a row on attach.
//! - **Managed**: bound to one row handle, one [`Metadata`] and one store.
//!   The transition happens once and is never reversed.
//!
//! Managed objects are equal iff their rows are the same native row.
//! Unmanaged objects are equal only to themselves.
//!
//! ## Subscriptions
//!
//! ```text
//! Unsubscribed ──first subscribe──► Subscribed(token)
//!      ▲                                 │
//!      └────────last unsubscribe─────────┘
//! ```
//!
//! While subscribed, the core owns a [`NotificationToken`] whose registry slot
//! holds only a weak reference back to the object.

use crate::accessor;
use crate::handle::NativeHandle;
use crate::link_list::LinkList;
use crate::marshal;
use crate::metadata::{Metadata, PropertyMetadata};
use crate::notify::{ChangeTarget, NotificationToken};
use crate::schema::ObjectSchema;
use crate::store::StoreInner;
use once_cell::unsync::OnceCell;
use std::any::{type_name, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tether_core::{kind_of, ColumnType, Error, HandleKind, Result, RowKey, Value, ValueKind};
use tracing::{debug, trace, warn};

/// A type whose instances can be bound to rows of a native table
///
/// # Example
///
/// ```ignore
/// struct Dog {
///     core: ObjectCore,
///     name: String,
/// }
///
/// impl Persistable for Dog {
///     const TABLE: &'static str = "Dog";
///
///     fn schema() -> Result<ObjectSchema> {
///         ObjectSchema::builder::<Self>().property::<String>("name").build()
///     }
///
///     fn from_core(core: ObjectCore) -> Self {
///         Dog { core, name: String::new() }
///     }
///
///     fn core(&self) -> &ObjectCore {
///         &self.core
///     }
///
///     fn copy_to(&self, row: &RowWriter<'_>) -> Result<()> {
///         row.set("name", self.name.clone())
///     }
/// }
/// ```
pub trait Persistable: Sized + 'static {
    /// Native table backing this type
    const TABLE: &'static str;

    /// Declared properties
    fn schema() -> Result<ObjectSchema>;

    /// Construct a managed instance around a bound core
    fn from_core(core: ObjectCore) -> Self;

    /// Binding state of this instance
    fn core(&self) -> &ObjectCore;

    /// Copy field values of an unmanaged instance into its new row.
    ///
    /// Called once, right after the instance is bound during attach.
    fn copy_to(&self, row: &RowWriter<'_>) -> Result<()>;

    /// Whether `other` is bound to the same native row
    fn same_row(&self, other: &Self) -> bool {
        self.core() == other.core()
    }

    /// Whether this instance is bound to a row
    fn is_managed(&self) -> bool {
        self.core().is_managed()
    }

    /// Whether the bound row and store are still alive
    fn is_valid(&self) -> bool {
        self.core().is_valid()
    }

    /// Stable key of the bound row
    fn row_key(&self) -> Result<RowKey> {
        self.core().row_key()
    }
}

impl<T: Persistable> ChangeTarget for T {
    fn column_changed(&self, column: usize) {
        self.core().raise(column);
    }
}

/// Identifier of one property-changed handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<dyn FnMut(&str)>>;

#[derive(Debug, Default)]
enum Subscription {
    #[default]
    Unsubscribed,
    Subscribed(NotificationToken),
}

pub(crate) struct Managed {
    store: Rc<StoreInner>,
    row: NativeHandle,
    metadata: RefCell<Arc<Metadata>>,
}

impl Managed {
    pub(crate) fn new(store: Rc<StoreInner>, row: NativeHandle, metadata: Arc<Metadata>) -> Self {
        Self {
            store,
            row,
            metadata: RefCell::new(metadata),
        }
    }

    /// Metadata for the store's current schema generation
    fn metadata(&self) -> Result<Arc<Metadata>> {
        let cached = Arc::clone(&self.metadata.borrow());
        if cached.generation() == self.store.generation() {
            return Ok(cached);
        }
        let current = self.store.metadata(cached.type_id())?;
        *self.metadata.borrow_mut() = Arc::clone(&current);
        Ok(current)
    }
}

/// Binding state embedded in every [`Persistable`] type
#[derive(Default)]
pub struct ObjectCore {
    managed: OnceCell<Managed>,
    subscription: RefCell<Subscription>,
    handlers: RefCell<Vec<(SubscriptionId, Handler)>>,
    last_subscription: Cell<u64>,
}

impl ObjectCore {
    /// State of a new, unmanaged object
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bound(managed: Managed) -> Self {
        let core = Self::default();
        let _ = core.managed.set(managed);
        core
    }

    /// Bind an unmanaged core. Fails if already bound.
    pub(crate) fn bind(&self, managed: Managed) -> Result<()> {
        self.managed
            .set(managed)
            .map_err(|_| Error::not_managed("bind an object that is already managed"))
    }

    pub(crate) fn store(&self) -> Option<&Rc<StoreInner>> {
        self.managed.get().map(|m| &m.store)
    }

    pub(crate) fn row(&self) -> Option<&NativeHandle> {
        self.managed.get().map(|m| &m.row)
    }

    fn require_managed(&self, operation: impl FnOnce() -> String) -> Result<&Managed> {
        self.managed
            .get()
            .ok_or_else(|| Error::not_managed(operation()))
    }

    /// Whether this object is bound to a row
    pub fn is_managed(&self) -> bool {
        self.managed.get().is_some()
    }

    /// False when unmanaged, after the row was removed, or after the store closed
    pub fn is_valid(&self) -> bool {
        match self.managed.get() {
            Some(m) => {
                !m.store.is_closed()
                    && m.row.is_valid()
                    && m.row
                        .call(|e, raw, err| e.row_is_attached(raw, err))
                        .unwrap_or(false)
            }
            None => false,
        }
    }

    /// Stable key of the bound row
    pub fn row_key(&self) -> Result<RowKey> {
        let m = self.require_managed(|| "read the row key".to_string())?;
        m.row
            .call(|e, raw, err| e.row_key(raw, err))
            .map(RowKey::new)
    }

    /// Row key, checked to belong to `store`
    pub(crate) fn row_key_in(&self, store: &Rc<StoreInner>, operation: &str) -> Result<RowKey> {
        let m = self.require_managed(|| operation.to_string())?;
        if !Rc::ptr_eq(&m.store, store) {
            return Err(Error::not_managed(format!(
                "{} with an object owned by another store",
                operation
            )));
        }
        self.row_key()
    }

    /// Metadata of the bound type for the current schema generation
    pub fn metadata(&self) -> Result<Arc<Metadata>> {
        self.require_managed(|| "read metadata".to_string())?
            .metadata()
    }

    fn typed_property<'m, T: 'static>(
        metadata: &'m Metadata,
        name: &str,
    ) -> Result<&'m PropertyMetadata> {
        let property = metadata.property(name)?;
        let info = kind_of::<T>()?;
        if info.kind != property.kind {
            return Err(Error::schema_mismatch(format!(
                "{}.{} is a {} property, accessed as {}",
                metadata.type_name(),
                name,
                property.kind,
                type_name::<T>()
            )));
        }
        Ok(property)
    }

    /// Read a property as `T`
    ///
    /// # Errors
    ///
    /// - [`Error::NotManaged`] for unmanaged objects
    /// - [`Error::SchemaMismatch`] for unknown properties or a kind other than `T`'s
    /// - [`Error::InvalidatedHandle`] after the row or store was released
    pub fn get<T: ColumnType>(&self, name: &str) -> Result<T> {
        let m = self.require_managed(|| format!("read property '{}'", name))?;
        let metadata = m.metadata()?;
        let property = Self::typed_property::<T>(&metadata, name)?;
        let value = accessor::get_value(&m.row, property, m.store.capacity())?;
        T::from_value(value)
    }

    /// Write a property
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus [`Error::NotInWriteScope`] outside a write scope.
    pub fn set<T: ColumnType>(&self, name: &str, value: T) -> Result<()> {
        let m = self.require_managed(|| format!("write property '{}'", name))?;
        m.store.require_write()?;
        let metadata = m.metadata()?;
        let property = Self::typed_property::<T>(&metadata, name)?;
        accessor::set_value(&m.row, property, value.into_value())
    }

    /// Read a property as an untyped [`Value`]
    pub fn get_value(&self, name: &str) -> Result<Value> {
        let m = self.require_managed(|| format!("read property '{}'", name))?;
        let metadata = m.metadata()?;
        accessor::get_value(&m.row, metadata.property(name)?, m.store.capacity())
    }

    /// Write an untyped [`Value`]
    pub fn set_value(&self, name: &str, value: Value) -> Result<()> {
        let m = self.require_managed(|| format!("write property '{}'", name))?;
        m.store.require_write()?;
        let metadata = m.metadata()?;
        accessor::set_value(&m.row, metadata.property(name)?, value)
    }

    fn link_property<'m, U: Persistable>(
        metadata: &'m Metadata,
        name: &str,
        kind: ValueKind,
    ) -> Result<&'m PropertyMetadata> {
        let property = metadata.property(name)?;
        accessor::expect_kind(property, kind)?;
        if property.target != Some(TypeId::of::<U>()) {
            return Err(Error::schema_mismatch(format!(
                "{}.{} does not link to {}",
                metadata.type_name(),
                name,
                type_name::<U>()
            )));
        }
        Ok(property)
    }

    /// Follow a link property
    pub fn get_link<U: Persistable>(&self, name: &str) -> Result<Option<Rc<U>>> {
        let m = self.require_managed(|| format!("read link '{}'", name))?;
        let metadata = m.metadata()?;
        let property = Self::link_property::<U>(&metadata, name, ValueKind::Link)?;
        match accessor::get_link(&m.row, property)? {
            Some(key) => m.store.find::<U>(key),
            None => Ok(None),
        }
    }

    /// Point a link property at `target`, or clear it with `None`.
    ///
    /// An unmanaged `target` is attached to this object's store first. That
    /// attach does not cascade: links `target` itself makes to unmanaged
    /// objects fail with [`Error::NotManaged`].
    pub fn set_link<U: Persistable>(&self, name: &str, target: Option<&Rc<U>>) -> Result<()> {
        self.set_link_with(name, target, true)
    }

    pub(crate) fn set_link_with<U: Persistable>(
        &self,
        name: &str,
        target: Option<&Rc<U>>,
        auto_attach: bool,
    ) -> Result<()> {
        let m = self.require_managed(|| format!("write link '{}'", name))?;
        m.store.require_write()?;
        let metadata = m.metadata()?;
        let property = Self::link_property::<U>(&metadata, name, ValueKind::Link)?;
        let key = match target {
            Some(target) => Some(self.attach_target(m, target, name, auto_attach)?),
            None => None,
        };
        accessor::set_link(&m.row, property, key)
    }

    fn attach_target<U: Persistable>(
        &self,
        m: &Managed,
        target: &Rc<U>,
        name: &str,
        auto_attach: bool,
    ) -> Result<RowKey> {
        if !target.core().is_managed() {
            if !auto_attach {
                return Err(Error::not_managed(format!(
                    "link '{}' to an unmanaged {} during auto-attach",
                    name,
                    type_name::<U>()
                )));
            }
            debug!(target: "tether::store", link = name, type_name = type_name::<U>(), "Auto-attaching link target");
            m.store.attach(target, false)?;
        }
        target
            .core()
            .row_key_in(&m.store, &format!("link '{}'", name))
    }

    /// Open the link list stored in property `name`
    pub fn get_list<U: Persistable>(&self, name: &str) -> Result<LinkList<U>> {
        let m = self.require_managed(|| format!("open link list '{}'", name))?;
        let metadata = m.metadata()?;
        let property = Self::link_property::<U>(&metadata, name, ValueKind::LinkList)?;
        let col = property.column.get();
        let handle = m
            .row
            .acquire(HandleKind::LinkList, |e, raw, err| e.get_linklist(raw, col, err))?;
        Ok(LinkList::new(handle, Rc::clone(&m.store)))
    }

    pub(crate) fn extend_list_with<U: Persistable>(
        &self,
        name: &str,
        items: &[Rc<U>],
        auto_attach: bool,
    ) -> Result<()> {
        let m = self.require_managed(|| format!("write link list '{}'", name))?;
        let list = self.get_list::<U>(name)?;
        for item in items {
            self.attach_target(m, item, name, auto_attach)?;
            list.add(item)?;
        }
        Ok(())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Add a property-changed handler. The first handler registers the row
    /// with the native engine; `target` is held weakly.
    ///
    /// # Errors
    ///
    /// [`Error::NotManaged`] for unmanaged objects; native registration failures.
    pub fn subscribe(
        &self,
        target: Weak<dyn ChangeTarget>,
        handler: impl FnMut(&str) + 'static,
    ) -> Result<SubscriptionId> {
        let m = self.require_managed(|| "subscribe to property changes".to_string())?;
        m.store.ensure_open()?;

        let unsubscribed = matches!(*self.subscription.borrow(), Subscription::Unsubscribed);
        if unsubscribed {
            let registry = m.store.registry();
            let token = registry.register(target);
            let registered = m.store.handle().with_raw(|_, store_raw| {
                m.row
                    .call(|e, row_raw, err| e.add_observed_object(store_raw, row_raw, token, err))
            });
            if let Err(e) = registered {
                registry.release(token);
                return Err(e);
            }
            *self.subscription.borrow_mut() = Subscription::Subscribed(NotificationToken::new(
                token,
                Arc::clone(m.row.engine()),
                Rc::clone(registry),
            ));
            debug!(target: "tether::notify", %token, "Subscribed");
        }

        let id = SubscriptionId(self.last_subscription.get() + 1);
        self.last_subscription.set(id.0);
        let handler: Handler = Rc::new(RefCell::new(handler));
        self.handlers.borrow_mut().push((id, handler));
        Ok(id)
    }

    /// Remove a handler. Removing the last one unregisters from the engine.
    ///
    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let (removed, now_empty) = {
            let mut handlers = self.handlers.borrow_mut();
            let before = handlers.len();
            handlers.retain(|(h, _)| *h != id);
            (handlers.len() != before, handlers.is_empty())
        };
        if removed && now_empty {
            let previous = std::mem::take(&mut *self.subscription.borrow_mut());
            if let Subscription::Subscribed(token) = previous {
                token.unregister()?;
                debug!(target: "tether::notify", token = %token.token(), "Unsubscribed");
            }
        }
        Ok(removed)
    }

    /// Whether a native registration is live
    pub fn is_subscribed(&self) -> bool {
        match &*self.subscription.borrow() {
            Subscription::Subscribed(token) => token.is_registered(),
            Subscription::Unsubscribed => false,
        }
    }

    /// Number of attached handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Raise property-changed for a native column
    pub(crate) fn raise(&self, column: usize) {
        let name = self
            .managed
            .get()
            .and_then(|m| m.metadata().ok())
            .and_then(|metadata| metadata.property_at(column).map(|p| p.name.clone()));
        let name = match name {
            Some(name) => name,
            None => {
                trace!(target: "tether::notify", column, "Change on unmapped column ignored");
                return;
            }
        };

        let handlers: Vec<Handler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(name.as_str()),
                Err(_) => {
                    warn!(target: "tether::notify", property = %name, "Skipped re-entrant property-changed handler");
                }
            }
        }
    }
}

impl PartialEq for ObjectCore {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let (a, b) = match (self.managed.get(), other.managed.get()) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        let same_engine = std::ptr::eq(
            Arc::as_ptr(a.row.engine()) as *const (),
            Arc::as_ptr(b.row.engine()) as *const (),
        );
        same_engine
            && a.row
                .with_raw(|e, ra| {
                    b.row
                        .with_raw(|_, rb| marshal::call(|err| e.rows_equal(ra, rb, err)))
                })
                .unwrap_or(false)
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ObjectCore");
        match self.managed.get() {
            Some(m) => s.field("row", &m.row),
            None => s.field("row", &Option::<NativeHandle>::None),
        };
        s.field("subscribers", &self.handlers.borrow().len()).finish()
    }
}

/// Writes the fields of a newly attached object
///
/// Links set through the writer may attach unmanaged targets, unless the
/// writer itself belongs to an auto-attached object.
pub struct RowWriter<'a> {
    core: &'a ObjectCore,
    auto_attach: bool,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(core: &'a ObjectCore, auto_attach: bool) -> Self {
        Self { core, auto_attach }
    }

    /// Write a scalar property
    pub fn set<V: ColumnType>(&self, name: &str, value: V) -> Result<()> {
        self.core.set(name, value)
    }

    /// Write a link property
    pub fn set_link<U: Persistable>(&self, name: &str, target: Option<&Rc<U>>) -> Result<()> {
        self.core.set_link_with(name, target, self.auto_attach)
    }

    /// Append `items` to a link-list property
    pub fn extend_list<U: Persistable>(&self, name: &str, items: &[Rc<U>]) -> Result<()> {
        self.core.extend_list_with(name, items, self.auto_attach)
    }
}

/// Property-changed subscriptions on shared facades
pub trait Observable {
    /// Attach a handler receiving the name of each changed property
    fn subscribe(&self, handler: impl FnMut(&str) + 'static) -> Result<SubscriptionId>;

    /// Detach a handler
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool>;
}

impl<T: Persistable> Observable for Rc<T> {
    fn subscribe(&self, handler: impl FnMut(&str) + 'static) -> Result<SubscriptionId> {
        let weak: Weak<T> = Rc::downgrade(self);
        let target: Weak<dyn ChangeTarget> = weak;
        self.core().subscribe(target, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.core().unsubscribe(id)
    }
}
