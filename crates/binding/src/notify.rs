//! Change notification bridge
//!
//! The native engine knows observers only by [`CorrelationToken`]. The
//! [`NotificationRegistry`] maps each live token to a *weak* reference to the
//! observing object, so an observed object stays collectible: a token whose
//! object is gone resolves to nothing and its callbacks are dropped.
//!
//! ## Token lifecycle
//!
//! ```text
//! register ──► slot live ──► NotificationToken::unregister
//!                              1. remove_observed_object (native)
//!                              2. release slot
//! ```
//!
//! Tokens come from a monotonic counter and are never reused, so a callback
//! for a torn-down registration can never reach a newer subscriber.

use crate::marshal;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tether_core::{CorrelationToken, Result};
use tether_native::NativeEngine;
use tracing::{debug, trace, warn};

/// Receiver of native change callbacks
pub trait ChangeTarget {
    /// Called once per changed native column
    fn column_changed(&self, column: usize);
}

/// Registry of live correlation tokens for one store
#[derive(Default)]
pub struct NotificationRegistry {
    last_token: Cell<u64>,
    slots: RefCell<FxHashMap<CorrelationToken, Weak<dyn ChangeTarget>>>,
}

impl NotificationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh token for `target`
    pub fn register(&self, target: Weak<dyn ChangeTarget>) -> CorrelationToken {
        let token = CorrelationToken::from_raw(self.last_token.get() + 1);
        self.last_token.set(token.as_raw());
        self.slots.borrow_mut().insert(token, target);
        token
    }

    /// Release the slot of `token`. Returns false if it was not live.
    pub fn release(&self, token: CorrelationToken) -> bool {
        self.slots.borrow_mut().remove(&token).is_some()
    }

    /// Whether `token` still has a slot
    pub fn contains(&self, token: CorrelationToken) -> bool {
        self.slots.borrow().contains_key(&token)
    }

    /// Resolve a token to its object, if both slot and object are alive
    pub fn resolve(&self, token: CorrelationToken) -> Option<Rc<dyn ChangeTarget>> {
        self.slots.borrow().get(&token).and_then(Weak::upgrade)
    }

    /// Live tokens in issue order
    pub fn tokens(&self) -> Vec<CorrelationToken> {
        let mut tokens: Vec<_> = self.slots.borrow().keys().copied().collect();
        tokens.sort();
        tokens
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// True when no slot is live
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Deliver native callbacks. Returns the number delivered to live objects.
    ///
    /// No registry borrow is held while targets run, so targets may subscribe
    /// or unsubscribe from inside their handlers.
    pub fn dispatch(&self, deliveries: &[(CorrelationToken, usize)]) -> usize {
        let mut delivered = 0;
        for &(token, column) in deliveries {
            match self.resolve(token) {
                Some(target) => {
                    target.column_changed(column);
                    delivered += 1;
                }
                None => {
                    trace!(target: "tether::notify", %token, column, "Dropped callback for expired token");
                }
            }
        }
        delivered
    }
}

/// Live native registration for one observed row
///
/// Unregisters on drop. Unregistering removes the native observer first and
/// releases the correlation slot second, exactly once.
pub struct NotificationToken {
    token: CorrelationToken,
    engine: Arc<dyn NativeEngine>,
    registry: Rc<NotificationRegistry>,
    done: Cell<bool>,
}

impl NotificationToken {
    pub(crate) fn new(
        token: CorrelationToken,
        engine: Arc<dyn NativeEngine>,
        registry: Rc<NotificationRegistry>,
    ) -> Self {
        Self {
            token,
            engine,
            registry,
            done: Cell::new(false),
        }
    }

    /// Correlation token handed to the engine
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    /// Whether the registration is still live
    pub fn is_registered(&self) -> bool {
        !self.done.get() && self.registry.contains(self.token)
    }

    /// Remove the native registration, then release the slot.
    ///
    /// A slot already released by a store close is not unregistered again.
    pub fn unregister(&self) -> Result<()> {
        if self.done.replace(true) {
            return Ok(());
        }
        if !self.registry.contains(self.token) {
            return Ok(());
        }
        let token = self.token;
        let removed = marshal::call(|err| self.engine.remove_observed_object(token, err));
        self.registry.release(token);
        debug!(target: "tether::notify", %token, "Notification token unregistered");
        removed
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Err(e) = self.unregister() {
            warn!(target: "tether::notify", token = %self.token, error = %e, "Failed to unregister notification token");
        }
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("token", &self.token)
            .field("registered", &self.is_registered())
            .finish()
    }
}
