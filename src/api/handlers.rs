use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::requests::{
    validation_details, ApproveAppointmentRequest, BookAppointmentRequest, CheckoutRequest,
    CreateTransactionRequest, ListTransactionsQuery, PaymentFailureRequest, UpdateNotesRequest, UpdateOrderStatusRequest,
    VerifyPaymentRequest,
};
use crate::api::responses::{
    ApiResponse, ErrorResponse, GatewayOrderResponse, PaymentFailureResponse, TransactionResponse,
};
use crate::error::AppError;
use crate::models::{Actor, TransactionKind, TransactionRecord};
use crate::observability::AggregatedHealth;

use super::routes::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn failure(action: &str, err: AppError) -> ApiError {
    let status = err.status_code();
    let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
        tracing::error!("Failed to {}: {}", action, err);
        "An internal error occurred".to_string()
    } else {
        tracing::debug!("Could not {}: {}", action, err);
        err.to_string()
    };
    (status, Json(ApiResponse::<()>::error(ErrorResponse::new(err.error_code(), message))))
}

fn invalid(errors: validator::ValidationErrors) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
                .with_details(validation_details(&errors)),
        )),
    )
}

fn ok<T>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::success(data))))
}

// ============================================================================
// Health Handlers
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::success(health)))
}

pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn liveness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed".to_string()),
    }
}

// ============================================================================
// Transaction Handlers
// ============================================================================

pub async fn create_transaction(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateTransactionRequest>,
) -> ApiResult<TransactionResponse> {
    request.validate().map_err(invalid)?;

    match state.service.create_pending_transaction(&actor, request.into()).await {
        Ok(record) => ok(StatusCode::CREATED, record.into()),
        Err(e) => Err(failure("create transaction", e)),
    }
}

pub async fn book_appointment(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<BookAppointmentRequest>,
) -> ApiResult<TransactionResponse> {
    request.validate().map_err(invalid)?;

    match state.service.book_appointment(&actor, request.into()).await {
        Ok(record) => ok(StatusCode::CREATED, record.into()),
        Err(e) => Err(failure("book appointment", e)),
    }
}

pub async fn checkout(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<TransactionResponse> {
    request.validate().map_err(invalid)?;

    match state.service.checkout(&actor, request.into()).await {
        Ok(record) => ok(StatusCode::CREATED, record.into()),
        Err(e) => Err(failure("place order", e)),
    }
}

pub async fn get_transaction(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransactionResponse> {
    match state.service.get_transaction(&actor, id).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("get transaction", e)),
    }
}

pub async fn list_my_transactions(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Vec<TransactionResponse>> {
    list(state.service.list_for_actor(&actor, query.kind).await)
}

pub async fn list_my_appointments(State(state): State<AppState>, actor: Actor) -> ApiResult<Vec<TransactionResponse>> {
    list(state.service.list_for_actor(&actor, Some(TransactionKind::Appointment)).await)
}

pub async fn list_my_orders(State(state): State<AppState>, actor: Actor) -> ApiResult<Vec<TransactionResponse>> {
    list(state.service.list_for_actor(&actor, Some(TransactionKind::Order)).await)
}

pub async fn list_all_transactions(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Vec<TransactionResponse>> {
    list(state.service.list_all(&actor, query.kind).await)
}

fn list(result: Result<Vec<TransactionRecord>, AppError>) -> ApiResult<Vec<TransactionResponse>> {
    match result {
        Ok(records) => ok(StatusCode::OK, records.into_iter().map(TransactionResponse::from).collect()),
        Err(e) => Err(failure("list transactions", e)),
    }
}

pub async fn get_transaction_by_gateway_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(gateway_order_id): Path<String>,
) -> ApiResult<TransactionResponse> {
    match state.service.find_by_gateway_order(&actor, &gateway_order_id).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("find transaction by gateway order", e)),
    }
}

// ============================================================================
// Payment Handlers
// ============================================================================

pub async fn open_gateway_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<GatewayOrderResponse> {
    match state.service.open_gateway_order(&actor, id).await {
        Ok(payload) => ok(StatusCode::OK, payload.into()),
        Err(e) => Err(failure("open gateway order", e)),
    }
}

pub async fn verify_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPaymentRequest>,
) -> ApiResult<TransactionResponse> {
    match state.service.verify_payment(&actor, id, request.into()).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("verify payment", e)),
    }
}

pub async fn report_payment_failure(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<PaymentFailureRequest>>,
) -> ApiResult<PaymentFailureResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    if let Some(reason) = &request.reason {
        tracing::info!(transaction_id = %id, reason = %reason, "Payment failure reported");
    }

    match state
        .service
        .report_payment_failure(&actor, id, request.gateway_order_id)
        .await
    {
        Ok(record) => {
            let removed = record.kind() == TransactionKind::Appointment;
            ok(
                StatusCode::OK,
                PaymentFailureResponse {
                    transaction_id: record.id,
                    removed,
                    transaction: (!removed).then(|| record.into()),
                },
            )
        }
        Err(e) => Err(failure("record payment failure", e)),
    }
}

// ============================================================================
// Appointment Handlers
// ============================================================================

pub async fn approve_appointment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveAppointmentRequest>>,
) -> ApiResult<TransactionResponse> {
    let schedule = body.and_then(|Json(r)| r.time);

    match state.service.approve(&actor, id, schedule).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("approve appointment", e)),
    }
}

pub async fn reject_appointment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransactionResponse> {
    match state.service.reject(&actor, id).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("reject appointment", e)),
    }
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransactionResponse> {
    match state.service.complete(&actor, id).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("complete appointment", e)),
    }
}

pub async fn update_notes(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateNotesRequest>,
) -> ApiResult<TransactionResponse> {
    request.validate().map_err(invalid)?;

    match state.service.update_notes(&actor, id, request.notes).await {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("update notes", e)),
    }
}

// ============================================================================
// Order Handlers
// ============================================================================

pub async fn update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<TransactionResponse> {
    request.validate().map_err(invalid)?;

    match state
        .service
        .advance_order_status(&actor, id, request.status, request.metadata())
        .await
    {
        Ok(record) => ok(StatusCode::OK, record.into()),
        Err(e) => Err(failure("update order status", e)),
    }
}
