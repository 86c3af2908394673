use hearth_core::Notification;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Platform notification channel. Implementations must return promptly;
/// dispatch is fire-and-forget from the caller's point of view.
pub trait NotificationSink: Send + Sync + 'static {
    fn dispatch(&self, notification: Notification);
}

/// Out-of-band delivery (email, SMS, ...) of a formatted alert message.
pub trait RecipientChannel: Send + Sync + 'static {
    fn deliver(&self, recipient: &str, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn dispatch(&self, notification: Notification) {
        info!(
            id = notification.id,
            priority = ?notification.priority,
            vibration = notification.vibration,
            sound = notification.sound,
            title = %notification.title,
            "{}",
            notification.message
        );
    }
}

impl RecipientChannel for TracingSink {
    fn deliver(&self, recipient: &str, message: &str) {
        info!(recipient, "Sending notification to recipient: {message}");
    }
}

/// Hands notifications to a bounded channel without waiting. When the
/// consumer falls behind, notifications are dropped with a warning.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn dispatch(&self, notification: Notification) {
        let id = notification.id;
        if let Err(e) = self.tx.try_send(notification) {
            warn!(id, error = %e, "Dropping notification");
        }
    }
}
