use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    AppointmentBooked,
    AppointmentApproved,
    AppointmentRejected,
    AppointmentCompleted,
    OrderPlaced,
    OrderStatusUpdated,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::AppointmentBooked => "APPOINTMENT_BOOKED",
            NotificationType::AppointmentApproved => "APPOINTMENT_APPROVED",
            NotificationType::AppointmentRejected => "APPOINTMENT_REJECTED",
            NotificationType::AppointmentCompleted => "APPOINTMENT_COMPLETED",
            NotificationType::OrderPlaced => "ORDER_PLACED",
            NotificationType::OrderStatusUpdated => "ORDER_STATUS_UPDATED",
        }
    }
}

impl FromStr for NotificationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "APPOINTMENT_BOOKED" => Ok(NotificationType::AppointmentBooked),
            "APPOINTMENT_APPROVED" => Ok(NotificationType::AppointmentApproved),
            "APPOINTMENT_REJECTED" => Ok(NotificationType::AppointmentRejected),
            "APPOINTMENT_COMPLETED" => Ok(NotificationType::AppointmentCompleted),
            "ORDER_PLACED" => Ok(NotificationType::OrderPlaced),
            "ORDER_STATUS_UPDATED" => Ok(NotificationType::OrderStatusUpdated),
            other => Err(AppError::Validation(format!("Unknown notification type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    /// Gave up after the configured number of attempts.
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Dead => "DEAD",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "DELIVERED" => Ok(OutboxStatus::Delivered),
            "DEAD" => Ok(OutboxStatus::Dead),
            other => Err(AppError::Validation(format!("Unknown outbox status: {}", other))),
        }
    }
}

/// Notification committed together with the state change that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub recipient_id: Uuid,
    pub event_type: NotificationType,
    pub title: String,
    pub body: String,
    pub related_id: Uuid,
    pub related_type: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        transaction_id: Uuid,
        recipient_id: Uuid,
        event_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        related_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            recipient_id,
            event_type,
            title: title.into(),
            body: body.into(),
            related_id: transaction_id,
            related_type: related_type.into(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            delivered_at: None,
        }
    }
}
