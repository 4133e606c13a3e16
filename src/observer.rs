//! Table-change observation.
//!
//! Adapters report every mutation they perform to the transaction's change
//! buffer. The buffer accumulates while the unit of work runs and is either
//! flushed through the database's [`ModelNotifier`](crate::notifier::ModelNotifier)
//! once the transaction commits, or discarded when it rolls back. A failed
//! transaction never leaks partial notifications.
//!
//! Listeners register with the [`ObserverRegistry`] for a set of table
//! names. Multiple registrations per table are allowed and all of them fire.
//! Registration and removal are safe while a flush is in progress: the
//! matching callbacks are snapshotted before any of them is invoked.

use fixedbitset::FixedBitSet;
use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

new_key_type! {
    /// Handle for a registered observer.
    pub struct ObserverHandle;
}

/// The kind of mutation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
    /// Consolidated table-level change, emitted once per touched table at
    /// the end of a flush.
    Change,
}

/// A single committed mutation.
///
/// Emitted once per committed change, consumed by zero or more subscribers.
/// The model payload is type-erased so notifications from every table can
/// share one stream; [`ModelNotification::model`] recovers the typed
/// instance.
#[derive(Clone)]
pub enum ModelNotification {
    /// One model instance changed.
    ModelChange {
        table: &'static str,
        action: ChangeAction,
        model: Arc<dyn Any + Send + Sync>,
    },
    /// A table changed without a per-model payload.
    TableChange {
        table: &'static str,
        action: ChangeAction,
    },
}

impl ModelNotification {
    pub(crate) fn model_change<M: Send + Sync + 'static>(
        table: &'static str,
        action: ChangeAction,
        model: Arc<M>,
    ) -> Self {
        ModelNotification::ModelChange {
            table,
            action,
            model,
        }
    }

    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            ModelNotification::ModelChange { table, .. }
            | ModelNotification::TableChange { table, .. } => table,
        }
    }

    #[must_use]
    pub fn action(&self) -> ChangeAction {
        match self {
            ModelNotification::ModelChange { action, .. }
            | ModelNotification::TableChange { action, .. } => *action,
        }
    }

    /// Recover the typed model instance from a model-change notification.
    ///
    /// Returns `None` for table-level notifications and when `M` is not the
    /// model type of the originating table.
    #[must_use]
    pub fn model<M: Send + Sync + 'static>(&self) -> Option<Arc<M>> {
        match self {
            ModelNotification::ModelChange { model, .. } => {
                Arc::clone(model).downcast::<M>().ok()
            }
            ModelNotification::TableChange { .. } => None,
        }
    }
}

impl std::fmt::Debug for ModelNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelNotification::ModelChange { table, action, .. } => f
                .debug_struct("ModelChange")
                .field("table", table)
                .field("action", action)
                .finish_non_exhaustive(),
            ModelNotification::TableChange { table, action } => f
                .debug_struct("TableChange")
                .field("table", table)
                .field("action", action)
                .finish(),
        }
    }
}

type ObserverCallback = Arc<dyn Fn(&ModelNotification) + Send + Sync>;

struct Registration {
    tables: BTreeSet<String>,
    callback: ObserverCallback,
}

/// Registered listeners, keyed by [`ObserverHandle`].
pub struct ObserverRegistry {
    observers: RwLock<SlotMap<ObserverHandle, Registration>>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(SlotMap::with_capacity_and_key(4)),
        }
    }

    /// Register `callback` for changes to `tables`.
    ///
    /// The returned handle removes the registration again via
    /// [`Self::unregister`]. It is recommended that callbacks be as short as
    /// possible to not delay the execution of other observers.
    pub fn register(
        &self,
        tables: impl IntoIterator<Item = impl Into<String>>,
        callback: impl Fn(&ModelNotification) + Send + Sync + 'static,
    ) -> ObserverHandle {
        let registration = Registration {
            tables: tables.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
        };
        self.observers.write().insert(registration)
    }

    /// Remove a registration. Returns `false` if the handle was already
    /// removed.
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        self.observers.write().remove(handle).is_some()
    }

    /// Invoke every callback registered for the notification's table.
    ///
    /// Matching callbacks are cloned out under the read lock and invoked
    /// without it, so a callback may itself register or unregister
    /// observers.
    pub(crate) fn dispatch(&self, notification: &ModelNotification) {
        let callbacks: Vec<ObserverCallback> = {
            let observers = self.observers.read();
            observers
                .values()
                .filter(|r| r.tables.contains(notification.table()))
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };
        for callback in callbacks {
            callback(notification);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates the tables and model changes touched by one in-flight
/// transaction.
///
/// State machine: Idle -> Accumulating (unit of work running, adapters
/// reporting) -> flush or discard -> Idle.
pub(crate) struct ChangeBuffer {
    /// Touched tables by registration-assigned table id.
    touched: FixedBitSet,
    pending: Vec<ModelNotification>,
    accumulating: bool,
}

impl ChangeBuffer {
    pub(crate) fn new() -> Self {
        Self {
            touched: FixedBitSet::new(),
            pending: Vec::new(),
            accumulating: false,
        }
    }

    pub(crate) fn begin(&mut self) {
        debug_assert!(!self.accumulating, "change buffer already accumulating");
        self.accumulating = true;
    }

    pub(crate) fn record(&mut self, table_id: usize, notification: ModelNotification) {
        debug_assert!(self.accumulating, "change recorded outside a transaction");
        if self.touched.len() <= table_id {
            self.touched.grow(table_id + 1);
        }
        self.touched.set(table_id, true);
        self.pending.push(notification);
    }

    /// Discard everything accumulated by a failed or cancelled transaction.
    pub(crate) fn discard(&mut self) {
        debug!(
            dropped = self.pending.len(),
            "discarding accumulated changes"
        );
        self.pending.clear();
        self.touched.clear();
        self.accumulating = false;
    }

    /// Emit the accumulated changes through `notify`.
    ///
    /// Model changes are emitted in mutation order, followed by one
    /// consolidated table-level change per touched table. `resolve` maps a
    /// table id back to its name.
    pub(crate) fn flush(
        &mut self,
        resolve: impl Fn(usize) -> Option<&'static str>,
        notify: impl Fn(ModelNotification),
    ) {
        debug_assert!(self.accumulating, "flush outside a transaction");
        for notification in self.pending.drain(..) {
            notify(notification);
        }
        for table_id in self.touched.ones() {
            // Safeguard against a stale index, just in case.
            if let Some(table) = resolve(table_id) {
                notify(ModelNotification::TableChange {
                    table,
                    action: ChangeAction::Change,
                });
            }
        }
        self.touched.clear();
        self.accumulating = false;
    }
}
