use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NotificationType, OutboxEvent};

pub mod topics {
    pub const NOTIFICATIONS: &str = "petcare.notifications";
}

/// Envelope wrapping every published notification with common metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: NotificationType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub correlation_id: Option<String>,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_id: Uuid, event_type: NotificationType, payload: T) -> Self {
        Self {
            event_id,
            event_type,
            timestamp: Utc::now(),
            source: "petcare-payments".to_string(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Notification as handed to downstream delivery (in-app, email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub related_entity_id: Uuid,
    pub related_entity_type: String,
}

impl From<&OutboxEvent> for EventEnvelope<Notification> {
    fn from(event: &OutboxEvent) -> Self {
        EventEnvelope::new(
            event.id,
            event.event_type,
            Notification {
                recipient_id: event.recipient_id,
                title: event.title.clone(),
                message: event.body.clone(),
                related_entity_id: event.related_id,
                related_entity_type: event.related_type.clone(),
            },
        )
        .with_correlation_id(event.transaction_id.to_string())
    }
}
