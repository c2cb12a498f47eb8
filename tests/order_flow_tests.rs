mod common;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use petcare_payments::error::AppError;
use petcare_payments::models::{
    Actor, LineItem, NotificationType, OrderStatus, PaymentStatus, Product, TransactionRecord,
    TransactionStatus,
};
use petcare_payments::repositories::OutboxStore;
use petcare_payments::services::{Checkout, OrderStatusMetadata};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;

fn item(product: &Product, quantity: i32) -> LineItem {
    LineItem {
        product_id: product.id,
        quantity,
        unit_price: product.price,
    }
}

fn checkout(items: Vec<LineItem>, declared_total: Option<Decimal>) -> Checkout {
    Checkout {
        items,
        shipping_address: "221B Baker Street, London".to_string(),
        declared_total,
    }
}

async fn place(app: &TestApp, customer: &Actor, items: Vec<LineItem>) -> TransactionRecord {
    app.service
        .checkout(customer, checkout(items, None))
        .await
        .expect("Failed to place order")
}

async fn advance(app: &TestApp, admin: &Actor, id: Uuid, next: OrderStatus) -> Result<TransactionRecord, AppError> {
    app.service
        .advance_order_status(admin, id, next, OrderStatusMetadata::default())
        .await
}

#[tokio::test]
async fn test_checkout_reserves_stock_and_totals_items() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let toy = app.add_product("Rope toy", dec!(120.50), 3).await;

    let order = app
        .service
        .checkout(&customer, checkout(vec![item(&food, 2), item(&toy, 1)], Some(dec!(620.50))))
        .await
        .unwrap();

    assert_eq!(order.amount, dec!(620.50));
    assert_eq!(order.status, TransactionStatus::Order(OrderStatus::Placed));
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
    assert!(order.counterparty_id.is_none());
    assert_eq!(
        order.order_details().unwrap().expected_delivery_date,
        Some(Utc::now().date_naive() + ChronoDuration::days(5))
    );
    assert_eq!(app.store.stock_of(food.id).await, Some(3));
    assert_eq!(app.store.stock_of(toy.id).await, Some(2));

    let payload = app.service.open_gateway_order(&customer, order.id).await.unwrap();
    assert_eq!(payload.amount, 62050);
    assert_eq!(app.gateway.last_request().unwrap().receipt, format!("order_{}", order.id.simple()));
}

#[tokio::test]
async fn test_total_mismatch_persists_nothing() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;

    let result = app
        .service
        .checkout(&customer, checkout(vec![item(&food, 2)], Some(dec!(450.00))))
        .await;

    assert!(matches!(result, Err(AppError::Validation(msg)) if msg.contains("Total mismatch")));
    assert_eq!(app.store.transaction_count().await, 0);
    assert_eq!(app.store.stock_of(food.id).await, Some(5));
}

#[tokio::test]
async fn test_insufficient_stock_is_a_conflict() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;

    // Quantities for the same product are aggregated across lines.
    let result = app
        .service
        .checkout(&customer, checkout(vec![item(&food, 3), item(&food, 3)], None))
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(app.store.transaction_count().await, 0);
    assert_eq!(app.store.stock_of(food.id).await, Some(5));
}

#[tokio::test]
async fn test_stale_unit_price_is_rejected() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;

    let mut line = item(&food, 1);
    line.unit_price = dec!(199.00);
    let result = app.service.checkout(&customer, checkout(vec![line], None)).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_empty_and_unknown_items_are_rejected() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());

    let result = app.service.checkout(&customer, checkout(vec![], None)).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let ghost = Product::new("Not in catalog", dec!(10.00), 1);
    let result = app.service.checkout(&customer, checkout(vec![item(&ghost, 1)], None)).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_fulfilment_requires_payment() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let admin = Actor::admin(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 1)]).await;

    let result = advance(&app, &admin, order.id, OrderStatus::Packed).await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));

    let paid = app.pay(&customer, order.id).await;
    assert_eq!(paid.payment_status(), PaymentStatus::Success);
    assert_eq!(paid.status, TransactionStatus::Order(OrderStatus::Placed));

    let events = app.store.events_for_transaction(order.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, NotificationType::OrderPlaced);
    assert_eq!(events[0].recipient_id, customer.id);
    assert_eq!(events[0].title, "Order Confirmation");

    let confirmed = advance(&app, &admin, order.id, OrderStatus::PaymentConfirmed).await.unwrap();
    assert_eq!(confirmed.status, TransactionStatus::Order(OrderStatus::PaymentConfirmed));
}

#[tokio::test]
async fn test_order_status_is_forward_only() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let admin = Actor::admin(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 1)]).await;
    app.pay(&customer, order.id).await;

    advance(&app, &admin, order.id, OrderStatus::Shipped).await.unwrap();

    let result = advance(&app, &admin, order.id, OrderStatus::Packed).await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));

    let delivered = advance(&app, &admin, order.id, OrderStatus::Delivered).await.unwrap();
    assert_eq!(delivered.status, TransactionStatus::Order(OrderStatus::Delivered));

    let result = advance(&app, &admin, order.id, OrderStatus::Cancelled).await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));

    // Replaying the current status is a no-op.
    let replay = advance(&app, &admin, order.id, OrderStatus::Delivered).await.unwrap();
    assert_eq!(replay.version, delivered.version);
}

#[tokio::test]
async fn test_customers_cannot_drive_fulfilment() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 1)]).await;
    app.pay(&customer, order.id).await;

    let result = advance(&app, &customer, order.id, OrderStatus::Shipped).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    // Once paid, even cancellation needs an admin.
    let result = advance(&app, &customer, order.id, OrderStatus::Cancelled).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_payer_cancel_restores_stock() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 4)]).await;
    assert_eq!(app.store.stock_of(food.id).await, Some(1));

    let cancelled = advance(&app, &customer, order.id, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Order(OrderStatus::Cancelled));
    assert_eq!(app.store.stock_of(food.id).await, Some(5));

    let events = app.store.events_for_transaction(order.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, NotificationType::OrderStatusUpdated);

    let result = app.service.open_gateway_order(&customer, order.id).await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_payer_cancel_replay_is_a_no_op() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 2)]).await;

    let cancelled = advance(&app, &customer, order.id, OrderStatus::Cancelled).await.unwrap();
    let replay = advance(&app, &customer, order.id, OrderStatus::Cancelled).await.unwrap();

    assert_eq!(replay.status, TransactionStatus::Order(OrderStatus::Cancelled));
    assert_eq!(replay.version, cancelled.version);
    assert_eq!(app.store.stock_of(food.id).await, Some(5));
    assert_eq!(app.store.events_for_transaction(order.id).await.unwrap().len(), 1);

    // The replay shortcut is only for the payer.
    let stranger = Actor::customer(Uuid::new_v4());
    let result = advance(&app, &stranger, order.id, OrderStatus::Cancelled).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_payment_failure_cancels_order_once() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 2)]).await;
    app.service.open_gateway_order(&customer, order.id).await.unwrap();

    let failed = app.service.report_payment_failure(&customer, order.id, None).await.unwrap();
    assert_eq!(failed.payment_status(), PaymentStatus::Failed);
    assert_eq!(failed.status, TransactionStatus::Order(OrderStatus::Cancelled));
    assert_eq!(app.store.stock_of(food.id).await, Some(5));

    let again = app.service.report_payment_failure(&customer, order.id, None).await.unwrap();
    assert_eq!(again.version, failed.version);
    assert_eq!(app.store.stock_of(food.id).await, Some(5));
}

#[tokio::test]
async fn test_delivery_date_update_with_status() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let admin = Actor::admin(Uuid::new_v4());
    let food = app.add_product("Grain-free dog food", dec!(250.00), 5).await;
    let order = place(&app, &customer, vec![item(&food, 1)]).await;
    app.pay(&customer, order.id).await;

    let new_date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
    let shipped = app
        .service
        .advance_order_status(
            &admin,
            order.id,
            OrderStatus::Shipped,
            OrderStatusMetadata {
                expected_delivery_date: Some(new_date),
                note: Some("Tracking: BLR123".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(shipped.order_details().unwrap().expected_delivery_date, Some(new_date));
    let events = app.store.events_for_transaction(order.id).await.unwrap();
    let update = events.last().unwrap();
    assert_eq!(update.event_type, NotificationType::OrderStatusUpdated);
    assert!(update.body.contains("2030-01-15"));
    assert!(update.body.contains("Tracking: BLR123"));
}

#[tokio::test]
async fn test_order_operations_reject_appointments() {
    let app = TestApp::new();
    let customer = Actor::customer(Uuid::new_v4());
    let admin = Actor::admin(Uuid::new_v4());
    let booked = app.book(&customer, Uuid::new_v4(), Uuid::new_v4(), dec!(300.00)).await;

    let result = advance(&app, &admin, booked.id, OrderStatus::Packed).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
