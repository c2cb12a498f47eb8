//! Notification content for each state change. Bodies are plain text; rich
//! templating happens downstream of the sink.

use chrono::NaiveDate;

use crate::models::{NotificationType, OrderStatus, OutboxEvent, TransactionRecord};

const APPOINTMENT: &str = "APPOINTMENT";
const ORDER: &str = "ORDER";

fn appointment_date(record: &TransactionRecord) -> String {
    record
        .appointment_details()
        .map(|d| d.date.to_string())
        .unwrap_or_default()
}

/// Sent to the doctor once the customer's payment is verified.
pub fn appointment_booked(record: &TransactionRecord) -> Option<OutboxEvent> {
    let doctor_id = record.counterparty_id?;
    Some(OutboxEvent::new(
        record.id,
        doctor_id,
        NotificationType::AppointmentBooked,
        "New Appointment Booked",
        format!(
            "A paid appointment request for {} is waiting for your approval",
            appointment_date(record)
        ),
        APPOINTMENT,
    ))
}

pub fn appointment_approved(record: &TransactionRecord) -> OutboxEvent {
    let when = match record.appointment_details().and_then(|d| d.time) {
        Some(time) => format!(" for {} at {}", appointment_date(record), time.format("%H:%M")),
        None => String::new(),
    };
    OutboxEvent::new(
        record.id,
        record.payer_id,
        NotificationType::AppointmentApproved,
        "Appointment Approved",
        format!("Your appointment has been approved{}", when),
        APPOINTMENT,
    )
}

pub fn appointment_rejected(record: &TransactionRecord) -> OutboxEvent {
    OutboxEvent::new(
        record.id,
        record.payer_id,
        NotificationType::AppointmentRejected,
        "Appointment Rejected",
        format!("Your appointment on {} has been rejected", appointment_date(record)),
        APPOINTMENT,
    )
}

pub fn appointment_completed(record: &TransactionRecord) -> OutboxEvent {
    OutboxEvent::new(
        record.id,
        record.payer_id,
        NotificationType::AppointmentCompleted,
        "Appointment Completed",
        format!("Your appointment on {} has been completed", appointment_date(record)),
        APPOINTMENT,
    )
}

/// Sent to the customer once an order's payment is verified.
pub fn order_confirmed(record: &TransactionRecord) -> OutboxEvent {
    let delivery = record
        .order_details()
        .and_then(|d| d.expected_delivery_date)
        .map(|d: NaiveDate| format!("\nExpected Delivery: {}", d))
        .unwrap_or_default();
    OutboxEvent::new(
        record.id,
        record.payer_id,
        NotificationType::OrderPlaced,
        "Order Confirmation",
        format!(
            "Your order #{} has been placed. Total: {} {}{}",
            record.id.simple(),
            record.amount,
            record.currency,
            delivery
        ),
        ORDER,
    )
}

pub fn order_status_updated(record: &TransactionRecord, status: OrderStatus, note: Option<&str>) -> OutboxEvent {
    let mut body = status.customer_message().to_string();
    if let Some(date) = record.order_details().and_then(|d| d.expected_delivery_date) {
        if !status.is_terminal() {
            body.push_str(&format!("\nExpected Delivery: {}", date));
        }
    }
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\n{}", note.trim()));
    }
    OutboxEvent::new(
        record.id,
        record.payer_id,
        NotificationType::OrderStatusUpdated,
        format!("Order Update - {}", status.as_str()),
        body,
        ORDER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentDetails, Currency};
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_approval_mentions_assigned_time() {
        let mut record = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(500),
            Currency::INR,
            AppointmentDetails {
                pet_id: Uuid::new_v4(),
                date: NaiveDate::from_ymd_opt(2025, 5, 20).unwrap(),
                time: None,
                reason: None,
                notes: None,
            },
        )
        .unwrap();
        record.appointment_details_mut().unwrap().time = NaiveTime::from_hms_opt(9, 15, 0);

        let event = appointment_approved(&record);
        assert_eq!(event.recipient_id, record.payer_id);
        assert_eq!(event.title, "Appointment Approved");
        assert!(event.body.ends_with("for 2025-05-20 at 09:15"));

        let booked = appointment_booked(&record).unwrap();
        assert_eq!(Some(booked.recipient_id), record.counterparty_id);
        assert_eq!(booked.related_type, "APPOINTMENT");
    }
}
