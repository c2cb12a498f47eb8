mod common;

use petcare_payments::events::{EventEnvelope, Notification, OutboxRelay, RelayConfig, RelayReport};
use petcare_payments::models::{Actor, NotificationType, OutboxStatus};
use petcare_payments::repositories::OutboxStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common::{RecordingSink, TestApp};

fn relay_config(max_attempts: i32) -> RelayConfig {
    RelayConfig {
        poll_interval: Duration::from_secs(60),
        batch_size: 10,
        max_attempts,
        delivery_timeout: Duration::from_secs(1),
    }
}

fn relay(app: &TestApp, sink: Arc<RecordingSink>, max_attempts: i32) -> OutboxRelay {
    OutboxRelay::new(
        app.store.clone(),
        sink,
        relay_config(max_attempts),
        app.service.outbox_signal(),
    )
}

async fn paid_appointment(app: &TestApp) -> (Actor, Uuid, Uuid) {
    let customer = Actor::customer(Uuid::new_v4());
    let doctor_id = Uuid::new_v4();
    let booked = app.book(&customer, doctor_id, Uuid::new_v4(), dec!(500.00)).await;
    app.pay(&customer, booked.id).await;
    (customer, doctor_id, booked.id)
}

#[tokio::test]
async fn test_relay_delivers_committed_events() {
    let app = TestApp::new();
    let (_, doctor_id, transaction_id) = paid_appointment(&app).await;
    let sink = Arc::new(RecordingSink::default());

    let report = relay(&app, sink.clone(), 3).run_once().await.unwrap();
    assert_eq!(report, RelayReport { delivered: 1, failed: 0 });

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].event_type, NotificationType::AppointmentBooked);
    assert_eq!(delivered[0].recipient_id, doctor_id);
    assert_eq!(delivered[0].transaction_id, transaction_id);
    assert_eq!(app.store.pending_count().await.unwrap(), 0);

    let events = app.store.events_for_transaction(transaction_id).await.unwrap();
    assert_eq!(events[0].status, OutboxStatus::Delivered);
    assert!(events[0].delivered_at.is_some());
}

#[tokio::test]
async fn test_failed_delivery_is_retried_on_next_pass() {
    let app = TestApp::new();
    let (_, _, transaction_id) = paid_appointment(&app).await;
    let sink = Arc::new(RecordingSink::failing(1));
    let relay = relay(&app, sink.clone(), 3);

    let report = relay.run_once().await.unwrap();
    assert_eq!(report, RelayReport { delivered: 0, failed: 1 });
    let events = app.store.events_for_transaction(transaction_id).await.unwrap();
    assert_eq!(events[0].status, OutboxStatus::Pending);
    assert_eq!(events[0].attempts, 1);
    assert_eq!(events[0].last_error.as_deref(), Some("Internal error: sink unavailable"));

    let report = relay.run_once().await.unwrap();
    assert_eq!(report, RelayReport { delivered: 1, failed: 0 });
    assert_eq!(sink.delivered().len(), 1);
}

#[tokio::test]
async fn test_event_is_abandoned_after_max_attempts() {
    let app = TestApp::new();
    let (_, _, transaction_id) = paid_appointment(&app).await;
    let sink = Arc::new(RecordingSink::failing(10));
    let relay = relay(&app, sink.clone(), 2);

    relay.run_once().await.unwrap();
    relay.run_once().await.unwrap();
    let report = relay.run_once().await.unwrap();
    assert_eq!(report, RelayReport::default());

    let events = app.store.events_for_transaction(transaction_id).await.unwrap();
    assert_eq!(events[0].status, OutboxStatus::Dead);
    assert_eq!(events[0].attempts, 2);
    assert!(sink.delivered().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_roll_back_payment() {
    let app = TestApp::new();
    let (customer, _, transaction_id) = paid_appointment(&app).await;
    let relay = relay(&app, Arc::new(RecordingSink::failing(10)), 1);

    relay.run_once().await.unwrap();

    let record = app.service.get_transaction(&customer, transaction_id).await.unwrap();
    assert!(record.is_paid());
}

#[tokio::test]
async fn test_background_relay_wakes_on_commit() {
    let app = TestApp::new();
    let sink = Arc::new(RecordingSink::default());
    let handle = relay(&app, sink.clone(), 3).start();

    paid_appointment(&app).await;

    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !sink.delivered().is_empty() {
                return sink.delivered();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay did not deliver in time");

    assert_eq!(delivered.len(), 1);
    handle.abort();
}

#[tokio::test]
async fn test_envelope_carries_notification_payload() {
    let app = TestApp::new();
    let (_, doctor_id, transaction_id) = paid_appointment(&app).await;
    let events = app.store.events_for_transaction(transaction_id).await.unwrap();

    let envelope = EventEnvelope::<Notification>::from(&events[0]);
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["payload"]["recipient_id"], doctor_id.to_string());
    assert_eq!(json["payload"]["title"], "New Appointment Booked");
}
