//! User-facing notifications.

use chatsync_model::TransactionId;
use parking_lot::Mutex;
use std::fmt;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The operation succeeded with something worth telling the user.
    Success,
    /// The operation degraded but data is safe.
    Warning,
    /// The operation failed.
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Warning => write!(f, "warning"),
            NotificationKind::Error => write!(f, "error"),
        }
    }
}

/// Action the user can take from a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// Run a parked transaction again.
    RetryNow(TransactionId),
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub kind: NotificationKind,
    /// Human readable text.
    pub message: String,
    /// Optional follow-up action.
    pub action: Option<NotificationAction>,
}

impl Notification {
    /// Creates a notification.
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            action: None,
        }
    }

    /// Creates a success notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    /// Creates a warning notification.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    /// Creates an error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    /// Attaches an action.
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Receiver of user-facing notifications.
///
/// Delivery is fire-and-forget; implementations must not block.
pub trait NotificationSink: Send + Sync {
    /// Delivers a notification.
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        let action = notification.action.map(|NotificationAction::RetryNow(id)| id.to_string());
        match notification.kind {
            NotificationKind::Success => {
                tracing::info!(action = ?action, "{}", notification.message)
            }
            NotificationKind::Warning => {
                tracing::warn!(action = ?action, "{}", notification.message)
            }
            NotificationKind::Error => {
                tracing::error!(action = ?action, "{}", notification.message)
            }
        }
    }
}

/// Sink that discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}

/// Sink that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Returns the notifications of one kind.
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the number of notifications received.
    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }

    /// Removes and returns everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.notifications.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_collects() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        sink.notify(Notification::success("merged 2 conversations"));
        sink.notify(Notification::warning("saved locally"));
        let id = TransactionId::new();
        sink.notify(Notification::error("save failed").with_action(NotificationAction::RetryNow(id)));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.of_kind(NotificationKind::Warning).len(), 1);

        let errors = sink.of_kind(NotificationKind::Error);
        assert_eq!(errors[0].action, Some(NotificationAction::RetryNow(id)));

        let taken = sink.take();
        assert_eq!(taken.len(), 3);
        assert!(sink.is_empty());
    }

    #[test]
    fn kind_display() {
        assert_eq!(NotificationKind::Success.to_string(), "success");
        assert_eq!(NotificationKind::Warning.to_string(), "warning");
        assert_eq!(NotificationKind::Error.to_string(), "error");
    }

    #[test]
    fn other_sinks_accept_notifications() {
        NullSink.notify(Notification::error("dropped"));
        TracingSink.notify(Notification::warning("logged"));
    }
}
