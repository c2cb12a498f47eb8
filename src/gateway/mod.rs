pub mod razorpay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use razorpay::HttpPaymentGateway;

/// Order creation request in the gateway's minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    /// Deterministic per transaction so the gateway can deduplicate retries.
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected the order with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway returned an unreadable response: {0}")]
    Decode(String),
}

/// Third-party payment provider that opens payment orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Public key id handed to the checkout client alongside the order.
    fn key_id(&self) -> &str;
}
