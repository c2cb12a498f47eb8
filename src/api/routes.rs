use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::observability::HealthChecker;
use crate::services::TransactionService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransactionService>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Arc<TransactionService>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            service,
            health_checker,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Transactions
        .route(
            "/transactions",
            post(handlers::create_transaction).get(handlers::list_my_transactions),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route("/transactions/:id/gateway-order", post(handlers::open_gateway_order))
        .route("/transactions/:id/verify-payment", post(handlers::verify_payment))
        .route("/transactions/:id/payment-failure", post(handlers::report_payment_failure))
        .route(
            "/gateway-orders/:gateway_order_id/transaction",
            get(handlers::get_transaction_by_gateway_order),
        )
        // Appointments
        .route(
            "/appointments",
            post(handlers::book_appointment).get(handlers::list_my_appointments),
        )
        .route("/appointments/:id/approve", put(handlers::approve_appointment))
        .route("/appointments/:id/reject", put(handlers::reject_appointment))
        .route("/appointments/:id/complete", put(handlers::complete_appointment))
        .route("/appointments/:id/notes", put(handlers::update_notes))
        // Orders
        .route("/orders", get(handlers::list_my_orders))
        .route("/orders/checkout", post(handlers::checkout))
        .route("/orders/:id/status", put(handlers::update_order_status))
        // Admin
        .route("/admin/transactions", get(handlers::list_all_transactions))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
