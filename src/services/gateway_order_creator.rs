use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::gateway::{CreateOrderRequest, PaymentGateway};
use crate::models::{Actor, PaymentStatus, TransactionRecord};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{CommitEffects, TransactionStore};
use crate::services::amount_converter::AmountConverter;

/// What the checkout client needs to launch the gateway's payment widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrderPayload {
    pub transaction_id: Uuid,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Opens gateway orders for pending transactions and records their ids.
#[derive(Clone)]
pub struct GatewayOrderCreator {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
    max_commit_retries: u32,
}

impl GatewayOrderCreator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        timeout: Duration,
        max_commit_retries: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            timeout,
            max_commit_retries,
        }
    }

    async fn load(&self, id: Uuid) -> Result<TransactionRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    fn payload(&self, record: &TransactionRecord, gateway_order_id: String) -> Result<GatewayOrderPayload> {
        Ok(GatewayOrderPayload {
            transaction_id: record.id,
            gateway_order_id,
            amount: AmountConverter::to_minor_units_for(record.amount, record.currency)?,
            currency: record.currency.code().to_string(),
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Fails unless the record can still take a payment.
    fn check_payable(actor: &Actor, record: &TransactionRecord) -> Result<()> {
        if record.payer_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "Only the payer can pay for transaction {}",
                record.id
            )));
        }
        match record.payment_status() {
            PaymentStatus::Success => Err(AppError::AlreadyPaid(record.id)),
            PaymentStatus::Failed => Err(AppError::InvalidTransition(format!(
                "Payment for transaction {} already failed",
                record.id
            ))),
            PaymentStatus::Pending if record.status.is_terminal() => Err(AppError::InvalidTransition(format!(
                "Transaction {} is already {}",
                record.id, record.status
            ))),
            PaymentStatus::Pending => Ok(()),
        }
    }

    /// Returns the open gateway order, creating one if none exists yet.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn open(&self, actor: &Actor, transaction_id: Uuid) -> Result<GatewayOrderPayload> {
        let record = self.load(transaction_id).await?;
        Self::check_payable(actor, &record)?;

        if let Some(existing) = record.open_gateway_order_id() {
            return self.payload(&record, existing.to_string());
        }

        let amount_minor = AmountConverter::to_minor_units_for(record.amount, record.currency)?;
        let mut notes = BTreeMap::new();
        notes.insert("transactionId".to_string(), record.id.to_string());
        notes.insert("kind".to_string(), record.kind().as_str().to_string());
        if let Some(doctor_id) = record.counterparty_id {
            notes.insert("doctorId".to_string(), doctor_id.to_string());
        }
        let request = CreateOrderRequest {
            amount_minor,
            currency: record.currency.code().to_string(),
            receipt: record.receipt_key(),
            notes,
        };

        // No record lock is held across the network call.
        let timer = LatencyTimer::new();
        let order = match tokio::time::timeout(self.timeout, self.gateway.create_order(request.clone())).await {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                get_metrics().record_gateway_order("error");
                warn!(transaction_id = %record.id, error = %e, "Gateway order creation failed");
                return Err(AppError::GatewayUnavailable(e.to_string()));
            }
            Err(_) => {
                get_metrics().record_gateway_order("timeout");
                warn!(transaction_id = %record.id, timeout_ms = self.timeout.as_millis() as u64, "Gateway order creation timed out");
                return Err(AppError::GatewayUnavailable(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )));
            }
        };
        get_metrics().record_gateway_latency(timer.elapsed_ms());

        if order.amount_minor != request.amount_minor || !order.currency.eq_ignore_ascii_case(&request.currency) {
            get_metrics().record_gateway_order("mismatch");
            return Err(AppError::GatewayUnavailable(format!(
                "gateway order {} is for {} {}, expected {} {}",
                order.id, order.amount_minor, order.currency, request.amount_minor, request.currency
            )));
        }

        for _ in 0..=self.max_commit_retries {
            let mut current = self.load(transaction_id).await?;
            Self::check_payable(actor, &current)?;

            if let Some(existing) = current.open_gateway_order_id() {
                // A concurrent open won; keep the first stored order.
                get_metrics().record_gateway_order("superseded");
                return self.payload(&current, existing.to_string());
            }

            current.gateway_order_id = Some(order.id.clone());
            match self.store.update(&current, current.version, CommitEffects::none()).await {
                Ok(updated) => {
                    get_metrics().record_gateway_order("created");
                    info!(transaction_id = %updated.id, gateway_order_id = %order.id, "Gateway order opened");
                    return self.payload(&updated, order.id);
                }
                Err(AppError::StaleRecord(_)) => {
                    get_metrics().record_commit_retry("open_gateway_order");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(format!(
            "Transaction {} kept changing while storing its gateway order",
            transaction_id
        )))
    }
}
