//! Pluggable notification publishing.
//!
//! The accumulation logic in [`crate::observer`] is identical for every
//! notifier, only the final publish step differs. [`DirectNotifier`] fans
//! out to in-process observers; [`ChannelNotifier`] pushes the erased
//! notifications onto a buffered stream so an external bridge (another
//! process boundary, a reactive wrapper) can re-publish them. Publishing
//! never blocks on slow subscribers.

use crate::observer::{ModelNotification, ObserverRegistry};
use std::sync::Arc;
use tracing::{debug, error};

/// Final publish step for committed changes.
pub trait ModelNotifier: Send + Sync {
    fn notify(&self, notification: ModelNotification);
}

/// In-process strategy: invoke the observer registry directly.
///
/// Runs on the dispatcher thread as part of transaction finalization, which
/// keeps the ordering guarantee that a transaction's notifications are
/// delivered before any later-enqueued transaction starts.
pub struct DirectNotifier {
    registry: Arc<ObserverRegistry>,
}

impl DirectNotifier {
    #[must_use]
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        Self { registry }
    }
}

impl ModelNotifier for DirectNotifier {
    fn notify(&self, notification: ModelNotification) {
        self.registry.dispatch(&notification);
    }
}

/// Broadcast strategy: publish onto a channel for external consumption.
///
/// The writer never waits for subscribers. With a bounded channel a full
/// buffer drops the notification and logs, it does not stall the dispatcher.
pub struct ChannelNotifier {
    sender: flume::Sender<ModelNotification>,
}

impl ChannelNotifier {
    /// Create an unbounded notifier and the receiving end of its stream.
    #[must_use]
    pub fn unbounded() -> (Self, flume::Receiver<ModelNotification>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Create a notifier buffering at most `capacity` undelivered
    /// notifications.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<ModelNotification>) {
        let (sender, receiver) = flume::bounded(capacity);
        (Self { sender }, receiver)
    }

    /// Publish onto an existing stream.
    #[must_use]
    pub fn from_sender(sender: flume::Sender<ModelNotification>) -> Self {
        Self { sender }
    }
}

impl ModelNotifier for ChannelNotifier {
    fn notify(&self, notification: ModelNotification) {
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(notification)) => {
                error!(
                    table = notification.table(),
                    "notification stream full, dropping notification"
                );
            }
            Err(flume::TrySendError::Disconnected(notification)) => {
                debug!(
                    table = notification.table(),
                    "notification stream has no subscribers"
                );
            }
        }
    }
}
