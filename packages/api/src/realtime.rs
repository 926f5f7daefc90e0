//! Listener registration and event formatting.

use dropq_actors::{ListenerId, QueueListener, SupervisorMessage};
use dropq_core::QueueEvent;
use tokio::sync::broadcast;

use crate::{ApiError, Services};

impl Services {
    /// Register a listener. It is called from the notifier, with operation
    /// churn coalesced.
    pub fn register_listener(&self, listener: impl QueueListener) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Subscribe to the raw event stream, without coalescing.
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Deliver pending coalesced notifications now.
    pub async fn flush_notifications(&self) -> Result<(), ApiError> {
        let (tx, rx) = dropq_actors::concurrency::oneshot();
        self.supervisor
            .send_message(SupervisorMessage::FlushNotifications { reply: tx.into() })
            .map_err(|e| ApiError::Runtime(format!("Failed to send message: {}", e)))?;

        rx.await
            .map_err(|_| ApiError::Runtime("Failed to receive response".to_string()))
    }
}

/// Format an event as one line of JSON.
pub fn format_event_line(event: &QueueEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_line_is_tagged_json() {
        let event: QueueEvent =
            serde_json::from_str(r#"{"event":"resync","timestamp":"2024-01-01T00:00:00Z"}"#)
                .expect("valid event");
        let line = format_event_line(&event);
        assert!(line.starts_with(r#"{"event":"resync""#), "{line}");
        assert!(!line.contains('\n'));
    }
}
