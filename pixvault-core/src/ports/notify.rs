use crate::types::Notification;

/// Fan-out for catalog and artifact events (websocket broadcaster, pub/sub).
///
/// Publishing never fails from the caller's point of view; an adapter with no
/// listeners simply drops the message.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}
