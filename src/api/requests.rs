use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::api::responses::ValidationErrorDetail;
use crate::models::{LineItem, OrderStatus, TransactionKind};
use crate::services::{
    BookAppointment, Checkout, OrderStatusMetadata, PaymentCallback, PendingTransactionRequest,
};

/// Request to book a paid consultation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub pet_id: Uuid,
    pub date: NaiveDate,
    pub preferred_time: Option<NaiveTime>,
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
    pub fee: Decimal,
}

impl From<BookAppointmentRequest> for BookAppointment {
    fn from(request: BookAppointmentRequest) -> Self {
        Self {
            doctor_id: request.doctor_id,
            pet_id: request.pet_id,
            date: request.date,
            preferred_time: request.preferred_time,
            reason: request.reason,
            fee: request.fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Request to place a marketplace order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<LineItemRequest>,
    #[validate(length(min = 1, max = 500, message = "shipping_address is required"))]
    pub shipping_address: String,
    pub total_amount: Option<Decimal>,
}

impl From<CheckoutRequest> for Checkout {
    fn from(request: CheckoutRequest) -> Self {
        Self {
            items: request
                .items
                .into_iter()
                .map(|i| LineItem {
                    product_id: i.product_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            shipping_address: request.shipping_address,
            declared_total: request.total_amount,
        }
    }
}

/// Either kind of pending transaction, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateTransactionRequest {
    Appointment(BookAppointmentRequest),
    Order(CheckoutRequest),
}

impl CreateTransactionRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            CreateTransactionRequest::Appointment(r) => r.validate(),
            CreateTransactionRequest::Order(r) => r.validate(),
        }
    }
}

impl From<CreateTransactionRequest> for PendingTransactionRequest {
    fn from(request: CreateTransactionRequest) -> Self {
        match request {
            CreateTransactionRequest::Appointment(r) => PendingTransactionRequest::Appointment(r.into()),
            CreateTransactionRequest::Order(r) => PendingTransactionRequest::Order(r.into()),
        }
    }
}

/// Fields posted back by the checkout widget. The `razorpay_*` names are
/// accepted as sent by the gateway's client library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: Option<String>,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: Option<String>,
    #[serde(alias = "razorpay_signature")]
    pub signature: Option<String>,
}

impl From<VerifyPaymentRequest> for PaymentCallback {
    fn from(request: VerifyPaymentRequest) -> Self {
        Self {
            gateway_order_id: request.gateway_order_id,
            gateway_payment_id: request.gateway_payment_id,
            signature: request.signature,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFailureRequest {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproveAppointmentRequest {
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateNotesRequest {
    #[validate(length(min = 1, max = 2000, message = "notes must be between 1 and 2000 characters"))]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub expected_delivery_date: Option<NaiveDate>,
    #[validate(length(max = 500, message = "note must be at most 500 characters"))]
    pub note: Option<String>,
}

impl UpdateOrderStatusRequest {
    pub fn metadata(&self) -> OrderStatusMetadata {
        OrderStatusMetadata {
            expected_delivery_date: self.expected_delivery_date,
            note: self.note.clone(),
        }
    }
}

/// Query string for listing endpoints, e.g. `?kind=ORDER`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListTransactionsQuery {
    pub kind: Option<TransactionKind>,
}

/// Flattens validator output into API error details, ordered by field.
pub fn validation_details(errors: &ValidationErrors) -> Vec<ValidationErrorDetail> {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}
