use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Currency, PaymentStatus, TransactionDetails, TransactionKind, TransactionRecord, TransactionStatus,
};
use crate::services::GatewayOrderPayload;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Appointment or order as seen by API clients. The gateway signature is
/// never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub payer_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub details: TransactionDetails,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind(),
            payment_status: record.payment_status(),
            payer_id: record.payer_id,
            counterparty_id: record.counterparty_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            gateway_order_id: record.gateway_order_id,
            gateway_payment_id: record.gateway_payment_id,
            details: record.details,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Payload for launching the gateway checkout widget. `amount` is in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrderResponse {
    pub transaction_id: Uuid,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

impl From<GatewayOrderPayload> for GatewayOrderResponse {
    fn from(payload: GatewayOrderPayload) -> Self {
        Self {
            transaction_id: payload.transaction_id,
            gateway_order_id: payload.gateway_order_id,
            amount: payload.amount,
            currency: payload.currency,
            key_id: payload.key_id,
        }
    }
}

/// Response to a payment failure report. Appointments are removed, so only
/// orders carry a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailureResponse {
    pub transaction_id: Uuid,
    pub removed: bool,
    pub transaction: Option<TransactionResponse>,
}
