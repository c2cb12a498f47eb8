mod common;

use async_trait::async_trait;
use mockall::mock;
use mockito::{Matcher, Server};
use petcare_payments::config::GatewaySettings;
use petcare_payments::error::AppError;
use petcare_payments::gateway::{
    CreateOrderRequest, GatewayError, GatewayOrder, HttpPaymentGateway, PaymentGateway,
};
use petcare_payments::models::Actor;
use petcare_payments::repositories::InMemoryStore;
use petcare_payments::services::TransactionService;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::TestApp;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;
        fn key_id(&self) -> &str;
    }
}

fn settings(base_url: String) -> GatewaySettings {
    GatewaySettings {
        base_url,
        key_id: common::KEY_ID.to_string(),
        key_secret: common::KEY_SECRET.to_string(),
        currency: "INR".to_string(),
        timeout_ms: 2000,
    }
}

fn order_request() -> CreateOrderRequest {
    let mut notes = BTreeMap::new();
    notes.insert("kind".to_string(), "APPOINTMENT".to_string());
    CreateOrderRequest {
        amount_minor: 50000,
        currency: "INR".to_string(),
        receipt: "appt_0001".to_string(),
        notes,
    }
}

#[tokio::test]
async fn test_open_gateway_order_reuses_existing_order() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let booked = app.book(&customer, Uuid::new_v4(), Uuid::new_v4(), dec!(500.00)).await;

    let first = app.service.open_gateway_order(&customer, booked.id).await.unwrap();
    let second = app.service.open_gateway_order(&customer, booked.id).await.unwrap();

    assert_eq!(first.gateway_order_id, second.gateway_order_id);
    assert_eq!(app.gateway.calls(), 1);

    let stored = app.service.get_transaction(&customer, booked.id).await.unwrap();
    assert_eq!(stored.gateway_order_id.as_deref(), Some(first.gateway_order_id.as_str()));
}

#[tokio::test]
async fn test_gateway_timeout_leaves_record_untouched() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let booked = app.book(&customer, Uuid::new_v4(), Uuid::new_v4(), dec!(500.00)).await;
    app.gateway.set_delay(Duration::from_millis(500));

    let result = app.service.open_gateway_order(&customer, booked.id).await;
    match result {
        Err(e @ AppError::GatewayUnavailable(_)) => assert!(e.is_retryable()),
        other => panic!("expected GatewayUnavailable, got {:?}", other),
    }

    let stored = app.service.get_transaction(&customer, booked.id).await.unwrap();
    assert!(stored.gateway_order_id.is_none());
    assert_eq!(stored.version, booked.version);
}

#[tokio::test]
async fn test_gateway_error_is_reported_as_unavailable() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let booked = app.book(&customer, Uuid::new_v4(), Uuid::new_v4(), dec!(500.00)).await;
    app.gateway.set_failing(true);

    let result = app.service.open_gateway_order(&customer, booked.id).await;
    assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));

    // A later attempt succeeds once the gateway recovers.
    app.gateway.set_failing(false);
    let payload = app.service.open_gateway_order(&customer, booked.id).await.unwrap();
    assert_eq!(payload.amount, 50000);
}

#[tokio::test]
async fn test_only_payer_may_open_gateway_order() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let booked = app.book(&customer, Uuid::new_v4(), Uuid::new_v4(), dec!(500.00)).await;

    let stranger = Actor::customer(Uuid::new_v4());
    let err = assert_err!(app.service.open_gateway_order(&stranger, booked.id).await);
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn test_gateway_amount_mismatch_is_not_stored() {
    let store = Arc::new(InMemoryStore::new());
    let mut gateway = MockGateway::new();
    gateway.expect_key_id().return_const("rzp_mock".to_string());
    gateway.expect_create_order().times(1).returning(|request| {
        Ok(GatewayOrder {
            id: "order_mismatch".to_string(),
            amount_minor: request.amount_minor - 1,
            currency: request.currency,
            receipt: Some(request.receipt),
        })
    });

    let service = TransactionService::new(store.clone(), store.clone(), Arc::new(gateway), common::test_config());
    let customer = Actor::customer(Uuid::new_v4());
    let booked = service
        .book_appointment(&customer, common::booking(Uuid::new_v4(), Uuid::new_v4(), dec!(500.00)))
        .await
        .unwrap();

    let result = service.open_gateway_order(&customer, booked.id).await;
    assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));

    let stored = service.get_transaction(&customer, booked.id).await.unwrap();
    assert!(stored.gateway_order_id.is_none());
}

#[tokio::test]
async fn test_http_gateway_creates_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/orders")
        .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
        .match_body(Matcher::PartialJson(json!({
            "amount": 50000,
            "currency": "INR",
            "receipt": "appt_0001",
            "payment_capture": 1,
            "notes": { "kind": "APPOINTMENT" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "order_9A33XWu170gUtm",
                "entity": "order",
                "amount": 50000,
                "currency": "INR",
                "receipt": "appt_0001",
                "status": "created"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let gateway = HttpPaymentGateway::new(&settings(server.url())).unwrap();
    let order = assert_ok!(gateway.create_order(order_request()).await);

    assert_eq!(order.id, "order_9A33XWu170gUtm");
    assert_eq!(order.amount_minor, 50000);
    assert_eq!(order.receipt.as_deref(), Some("appt_0001"));
    assert_eq!(gateway.key_id(), common::KEY_ID);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_gateway_surfaces_rejection() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/orders")
        .with_status(400)
        .with_body(r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"amount too small"}}"#)
        .create_async()
        .await;

    let gateway = HttpPaymentGateway::new(&settings(server.url())).unwrap();
    let result = gateway.create_order(order_request()).await;

    match result {
        Err(GatewayError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("amount too small"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_gateway_rejects_unreadable_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/orders")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let gateway = HttpPaymentGateway::new(&settings(server.url())).unwrap();
    let result = gateway.create_order(order_request()).await;
    assert!(matches!(result, Err(GatewayError::Decode(_))));
}
