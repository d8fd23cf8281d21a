//! Notification hooks for store changes.

use dbwatch_api::Database;
use std::sync::Arc;

/// Receives store changes as the informer applies them.
///
/// Callbacks run on the informer task after the store has been updated, so
/// a handler reading the store sees the new state. Keep them short; the
/// informer does not consume further events until they return.
pub trait EventHandler: Send + Sync {
    /// An object entered the store.
    fn on_add(&self, _object: &Database) {}

    /// An existing entry was overwritten.
    fn on_update(&self, _old: &Database, _new: &Database) {}

    /// An entry left the store, either by a watch event or by reconciliation.
    fn on_delete(&self, _object: &Database) {}
}

/// Ignores every notification.
impl EventHandler for () {}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_add(&self, object: &Database) {
        (**self).on_add(object)
    }

    fn on_update(&self, old: &Database, new: &Database) {
        (**self).on_update(old, new)
    }

    fn on_delete(&self, object: &Database) {
        (**self).on_delete(object)
    }
}
