use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GatewaySettings;
use crate::gateway::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentGateway};

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
    notes: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
}

/// Razorpay-compatible orders API client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            key_id: settings.key_id.clone(),
            key_secret: settings.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = OrderBody {
            amount: request.amount_minor,
            currency: &request.currency,
            receipt: &request.receipt,
            payment_capture: 1,
            notes: &request.notes,
        };

        debug!(receipt = %request.receipt, amount = request.amount_minor, "Creating gateway order");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gateway rejected order creation");
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(GatewayOrder {
            id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            receipt: order.receipt,
        })
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
