use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::events::messages;
use crate::gateway::PaymentGateway;
use crate::models::{
    Actor, AppointmentDetails, Currency, LineItem, OrderDetails, OrderStatus, StockAdjustment,
    TransactionKind, TransactionRecord,
};
use crate::observability::{get_metrics, mask_sensitive};
use crate::repositories::{CommitEffects, ProductCatalog, TransactionQuery, TransactionStore};
use crate::services::conflict_checker::ConflictChecker;
use crate::services::gateway_order_creator::{GatewayOrderCreator, GatewayOrderPayload};
use crate::services::signature_verifier::SignatureVerifier;
use crate::services::state_machine::{StatusTransitioner, TransitionOutcome};

/// Days between checkout and the initial delivery estimate.
const DEFAULT_DELIVERY_DAYS: i64 = 5;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub currency: Currency,
    pub key_secret: String,
    pub allow_unpaid_approval: bool,
    pub max_commit_retries: u32,
    pub gateway_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let currency = settings
            .gateway
            .currency
            .parse()
            .map_err(|e| AppError::Validation(format!("gateway.currency: {}", e)))?;

        Ok(Self {
            currency,
            key_secret: settings.gateway.signing_secret()?.to_string(),
            allow_unpaid_approval: settings.policy.allow_unpaid_approval,
            max_commit_retries: settings.policy.max_commit_retries,
            gateway_timeout: Duration::from_millis(settings.gateway.timeout_ms),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointment {
    pub doctor_id: Uuid,
    pub pet_id: Uuid,
    pub date: NaiveDate,
    pub preferred_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub items: Vec<LineItem>,
    pub shipping_address: String,
    /// Client-side total; rejected when it disagrees with the line items.
    pub declared_total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingTransactionRequest {
    Appointment(BookAppointment),
    Order(Checkout),
}

/// Gateway callback forwarded by the checkout client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderStatusMetadata {
    pub expected_delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// Payment-gated lifecycle of appointments and orders.
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    conflicts: ConflictChecker,
    gateway_orders: GatewayOrderCreator,
    verifier: SignatureVerifier,
    transitioner: StatusTransitioner,
    currency: Currency,
    max_commit_retries: u32,
    outbox_signal: Arc<Notify>,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        catalog: Arc<dyn ProductCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            conflicts: ConflictChecker::new(store.clone(), catalog),
            gateway_orders: GatewayOrderCreator::new(
                store.clone(),
                gateway,
                config.gateway_timeout,
                config.max_commit_retries,
            ),
            store,
            verifier: SignatureVerifier::new(config.key_secret),
            transitioner: StatusTransitioner::new(config.allow_unpaid_approval),
            currency: config.currency,
            max_commit_retries: config.max_commit_retries,
            outbox_signal: Arc::new(Notify::new()),
        }
    }

    /// Woken after every commit that wrote outbox events.
    pub fn outbox_signal(&self) -> Arc<Notify> {
        self.outbox_signal.clone()
    }

    async fn load(&self, id: Uuid) -> Result<TransactionRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    /// Read-validate-commit loop with an optimistic version check.
    ///
    /// `apply` returns `None` when the record is already in the requested
    /// state; the stored record is then returned unchanged.
    async fn mutate<F>(&self, id: Uuid, operation: &'static str, mut apply: F) -> Result<TransactionRecord>
    where
        F: FnMut(&mut TransactionRecord) -> Result<Option<CommitEffects>>,
    {
        for attempt in 0..=self.max_commit_retries {
            let current = self.load(id).await?;
            let mut working = current.clone();

            let Some(effects) = apply(&mut working)? else {
                debug!(transaction_id = %id, operation, "No-op replay");
                return Ok(current);
            };
            let has_events = !effects.events.is_empty();

            match self.store.update(&working, current.version, effects).await {
                Ok(updated) => {
                    if has_events {
                        self.outbox_signal.notify_one();
                    }
                    return Ok(updated);
                }
                Err(AppError::StaleRecord(_)) => {
                    get_metrics().record_commit_retry(operation);
                    debug!(transaction_id = %id, operation, attempt, "Lost version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(transaction_id = %id, operation, "Giving up after repeated concurrent modifications");
        Err(AppError::Conflict(format!(
            "Transaction {} is being modified concurrently, retry later",
            id
        )))
    }

    pub async fn create_pending_transaction(
        &self,
        actor: &Actor,
        request: PendingTransactionRequest,
    ) -> Result<TransactionRecord> {
        match request {
            PendingTransactionRequest::Appointment(booking) => self.book_appointment(actor, booking).await,
            PendingTransactionRequest::Order(checkout) => self.checkout(actor, checkout).await,
        }
    }

    #[tracing::instrument(skip(self, actor, booking), fields(actor_id = %actor.id, doctor_id = %booking.doctor_id))]
    pub async fn book_appointment(&self, actor: &Actor, booking: BookAppointment) -> Result<TransactionRecord> {
        let record = TransactionRecord::new_appointment(
            actor.id,
            booking.doctor_id,
            booking.fee,
            self.currency,
            AppointmentDetails {
                pet_id: booking.pet_id,
                date: booking.date,
                time: booking.preferred_time,
                reason: booking.reason,
                notes: None,
            },
        )?;

        self.conflicts
            .check_appointment(booking.doctor_id, booking.pet_id, booking.date)
            .await?;

        let stored = self.store.insert(&record, CommitEffects::none()).await?;
        get_metrics().record_transaction_created(TransactionKind::Appointment.as_str(), self.currency.code());
        info!(transaction_id = %stored.id, "Appointment booked, awaiting payment");
        Ok(stored)
    }

    #[tracing::instrument(skip(self, actor, checkout), fields(actor_id = %actor.id, items = checkout.items.len()))]
    pub async fn checkout(&self, actor: &Actor, checkout: Checkout) -> Result<TransactionRecord> {
        if checkout.shipping_address.trim().is_empty() {
            return Err(AppError::Validation("Shipping address is required".to_string()));
        }

        let reservations = self
            .conflicts
            .check_order(&checkout.items, checkout.declared_total)
            .await?;

        let expected_delivery = Utc::now().date_naive() + ChronoDuration::days(DEFAULT_DELIVERY_DAYS);
        let record = TransactionRecord::new_order(
            actor.id,
            self.currency,
            OrderDetails {
                items: checkout.items,
                shipping_address: checkout.shipping_address.trim().to_string(),
                expected_delivery_date: Some(expected_delivery),
            },
        )?;

        let stored = self
            .store
            .insert(&record, CommitEffects::none().with_reservations(reservations))
            .await?;
        get_metrics().record_transaction_created(TransactionKind::Order.as_str(), self.currency.code());
        info!(transaction_id = %stored.id, amount = %stored.amount, "Order placed, awaiting payment");
        Ok(stored)
    }

    pub async fn open_gateway_order(&self, actor: &Actor, transaction_id: Uuid) -> Result<GatewayOrderPayload> {
        self.gateway_orders.open(actor, transaction_id).await
    }

    /// Verifies a gateway callback and marks the payment successful.
    ///
    /// Replaying the payload that was already applied returns the current
    /// record without re-checking the signature or notifying again.
    #[tracing::instrument(skip(self, actor, callback), fields(actor_id = %actor.id))]
    pub async fn verify_payment(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        callback: PaymentCallback,
    ) -> Result<TransactionRecord> {
        let verifier = &self.verifier;
        let transitioner = &self.transitioner;

        let result = self
            .mutate(transaction_id, "verify_payment", |record| {
                if record.payer_id != actor.id && !actor.is_admin() {
                    return Err(AppError::Forbidden(format!(
                        "Only the payer can confirm payment for transaction {}",
                        record.id
                    )));
                }

                if record.is_paid()
                    && callback.gateway_order_id.is_some()
                    && record.gateway_order_id == callback.gateway_order_id
                    && record.gateway_payment_id == callback.gateway_payment_id
                    && record.gateway_signature == callback.signature
                {
                    return Ok(None);
                }

                let proof = verifier.verify(
                    callback.gateway_order_id.as_deref(),
                    callback.gateway_payment_id.as_deref(),
                    callback.signature.as_deref(),
                )?;

                match transitioner.apply_verified_payment(record, proof)? {
                    TransitionOutcome::Unchanged => Ok(None),
                    TransitionOutcome::Applied => {
                        let event = match record.kind() {
                            TransactionKind::Appointment => messages::appointment_booked(record),
                            TransactionKind::Order => Some(messages::order_confirmed(record)),
                        };
                        Ok(Some(CommitEffects {
                            events: event.into_iter().collect(),
                            ..CommitEffects::default()
                        }))
                    }
                }
            })
            .await;

        match &result {
            Ok(record) => {
                get_metrics().record_payment_verification("success");
                info!(
                    transaction_id = %record.id,
                    payment_id = %mask_sensitive(record.gateway_payment_id.as_deref().unwrap_or_default(), 4),
                    "Payment verified"
                );
            }
            Err(AppError::InvalidSignature) => {
                get_metrics().record_payment_verification("invalid_signature");
                warn!(transaction_id = %transaction_id, "Rejected payment callback with invalid signature");
            }
            Err(e) => {
                get_metrics().record_payment_verification("rejected");
                debug!(transaction_id = %transaction_id, error = %e, "Payment callback not applied");
            }
        }
        result
    }

    /// Reports an abandoned or declined payment.
    ///
    /// Appointments are removed in the same commit; orders are cancelled and
    /// their stock released.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn report_payment_failure(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        gateway_order_id: Option<String>,
    ) -> Result<TransactionRecord> {
        for _ in 0..=self.max_commit_retries {
            let current = self.load(transaction_id).await?;
            if current.payer_id != actor.id && !actor.is_admin() {
                return Err(AppError::Forbidden(format!(
                    "Only the payer can report payment failure for transaction {}",
                    current.id
                )));
            }
            if let Some(reported) = gateway_order_id.as_deref() {
                if current.gateway_order_id.as_deref() != Some(reported) {
                    return Err(AppError::Validation(format!(
                        "Gateway order {} does not belong to transaction {}",
                        reported, current.id
                    )));
                }
            }

            let previous_order_status = current.order_status();
            let mut working = current.clone();
            if self.transitioner.apply_payment_failure(&mut working)? == TransitionOutcome::Unchanged {
                return Ok(current);
            }

            let outcome = match working.kind() {
                TransactionKind::Appointment => self
                    .store
                    .delete(working.id, current.version, CommitEffects::none())
                    .await
                    .map(|_| working.clone()),
                TransactionKind::Order => {
                    let mut effects = CommitEffects::none();
                    let cancelled_now = previous_order_status.map_or(false, |s| !s.is_terminal())
                        && working.order_status() == Some(OrderStatus::Cancelled);
                    if cancelled_now {
                        effects = effects
                            .with_releases(stock_of(&working))
                            .with_event(messages::order_status_updated(&working, OrderStatus::Cancelled, None));
                    }
                    self.store.update(&working, current.version, effects).await
                }
            };

            match outcome {
                Ok(record) => {
                    self.outbox_signal.notify_one();
                    get_metrics().record_status_transition(record.kind().as_str(), "PAYMENT_FAILED");
                    info!(transaction_id = %record.id, "Payment failure recorded");
                    return Ok(record);
                }
                Err(AppError::StaleRecord(_)) => {
                    get_metrics().record_commit_retry("report_payment_failure");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(format!(
            "Transaction {} is being modified concurrently, retry later",
            transaction_id
        )))
    }

    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        schedule: Option<NaiveTime>,
    ) -> Result<TransactionRecord> {
        let transitioner = &self.transitioner;
        let record = self
            .mutate(transaction_id, "approve", |record| {
                require_counterparty(actor, record)?;
                Ok(match transitioner.approve(record, schedule)? {
                    TransitionOutcome::Unchanged => None,
                    TransitionOutcome::Applied => {
                        Some(CommitEffects::none().with_event(messages::appointment_approved(record)))
                    }
                })
            })
            .await?;
        get_metrics().record_status_transition(TransactionKind::Appointment.as_str(), record.status.as_str());
        Ok(record)
    }

    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn reject(&self, actor: &Actor, transaction_id: Uuid) -> Result<TransactionRecord> {
        let transitioner = &self.transitioner;
        let record = self
            .mutate(transaction_id, "reject", |record| {
                require_counterparty(actor, record)?;
                Ok(match transitioner.reject(record)? {
                    TransitionOutcome::Unchanged => None,
                    TransitionOutcome::Applied => {
                        Some(CommitEffects::none().with_event(messages::appointment_rejected(record)))
                    }
                })
            })
            .await?;
        get_metrics().record_status_transition(TransactionKind::Appointment.as_str(), record.status.as_str());
        Ok(record)
    }

    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn complete(&self, actor: &Actor, transaction_id: Uuid) -> Result<TransactionRecord> {
        let transitioner = &self.transitioner;
        let record = self
            .mutate(transaction_id, "complete", |record| {
                require_counterparty(actor, record)?;
                Ok(match transitioner.complete(record)? {
                    TransitionOutcome::Unchanged => None,
                    TransitionOutcome::Applied => {
                        Some(CommitEffects::none().with_event(messages::appointment_completed(record)))
                    }
                })
            })
            .await?;
        get_metrics().record_status_transition(TransactionKind::Appointment.as_str(), record.status.as_str());
        Ok(record)
    }

    /// Doctor's notes on an appointment; status is unaffected.
    pub async fn update_notes(&self, actor: &Actor, transaction_id: Uuid, notes: String) -> Result<TransactionRecord> {
        self.mutate(transaction_id, "update_notes", |record| {
            require_counterparty(actor, record)?;
            let details = record.appointment_details_mut().ok_or_else(|| {
                AppError::Validation(format!("Transaction {} is not an appointment", transaction_id))
            })?;
            if details.notes.as_deref() == Some(notes.as_str()) {
                return Ok(None);
            }
            details.notes = Some(notes.clone());
            Ok(Some(CommitEffects::none()))
        })
        .await
    }

    /// Admins move orders through fulfilment; payers may only cancel their
    /// own unpaid order while it is still PLACED. Requesting the current
    /// status is a no-op for the payer too.
    #[tracing::instrument(skip(self, actor, metadata), fields(actor_id = %actor.id, target = next.as_str()))]
    pub async fn advance_order_status(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        next: OrderStatus,
        metadata: OrderStatusMetadata,
    ) -> Result<TransactionRecord> {
        let transitioner = &self.transitioner;
        let record = self
            .mutate(transaction_id, "advance_order_status", |record| {
                let current = record.order_status().ok_or_else(|| {
                    AppError::Validation(format!("Transaction {} is not an order", record.id))
                })?;
                if current == next && record.payer_id == actor.id {
                    return Ok(None);
                }
                let payer_cancel = record.payer_id == actor.id
                    && next == OrderStatus::Cancelled
                    && current == OrderStatus::Placed
                    && !record.is_paid();
                if !actor.is_admin() && !payer_cancel {
                    return Err(AppError::Forbidden(format!(
                        "Not allowed to move order {} to {}",
                        record.id,
                        next.as_str()
                    )));
                }

                let outcome = transitioner.advance_order(record, next)?;
                let mut date_changed = false;
                if let (Some(date), Some(details)) = (metadata.expected_delivery_date, record.order_details_mut()) {
                    date_changed = details.expected_delivery_date != Some(date);
                    details.expected_delivery_date = Some(date);
                }

                match outcome {
                    TransitionOutcome::Unchanged if date_changed => Ok(Some(CommitEffects::none())),
                    TransitionOutcome::Unchanged => Ok(None),
                    TransitionOutcome::Applied => {
                        let mut effects = CommitEffects::none().with_event(messages::order_status_updated(
                            record,
                            next,
                            metadata.note.as_deref(),
                        ));
                        if next == OrderStatus::Cancelled {
                            effects = effects.with_releases(stock_of(record));
                        }
                        Ok(Some(effects))
                    }
                }
            })
            .await?;
        get_metrics().record_status_transition(TransactionKind::Order.as_str(), record.status.as_str());
        Ok(record)
    }

    pub async fn get_transaction(&self, actor: &Actor, transaction_id: Uuid) -> Result<TransactionRecord> {
        let record = self.load(transaction_id).await?;
        if !actor.is_admin() && !record.is_participant(actor.id) {
            return Err(AppError::Forbidden(format!(
                "Not allowed to view transaction {}",
                transaction_id
            )));
        }
        Ok(record)
    }

    /// Records the actor pays for or serves, newest first. Doctors see the
    /// appointments booked with them.
    pub async fn list_for_actor(&self, actor: &Actor, kind: Option<TransactionKind>) -> Result<Vec<TransactionRecord>> {
        self.store
            .find_matching(TransactionQuery::for_participant(actor.id).of_kind(kind))
            .await
    }

    /// Every record, newest first. Admins only.
    pub async fn list_all(&self, actor: &Actor, kind: Option<TransactionKind>) -> Result<Vec<TransactionRecord>> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden("Listing all transactions requires the admin role".to_string()));
        }
        self.store.find_matching(TransactionQuery::default().of_kind(kind)).await
    }

    pub async fn find_by_gateway_order(&self, actor: &Actor, gateway_order_id: &str) -> Result<TransactionRecord> {
        let record = self
            .store
            .find_by_gateway_order_id(gateway_order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No transaction for gateway order {}", gateway_order_id)))?;
        if !actor.is_admin() && !record.is_participant(actor.id) {
            return Err(AppError::Forbidden(format!("Not allowed to view transaction {}", record.id)));
        }
        Ok(record)
    }
}

fn require_counterparty(actor: &Actor, record: &TransactionRecord) -> Result<()> {
    if record.counterparty_id != Some(actor.id) {
        return Err(AppError::Unauthorized(format!(
            "Actor {} is not the doctor for appointment {}",
            actor.id, record.id
        )));
    }
    Ok(())
}

fn stock_of(record: &TransactionRecord) -> Vec<StockAdjustment> {
    record
        .order_details()
        .map(|d| {
            d.items
                .iter()
                .map(|i| StockAdjustment { product_id: i.product_id, quantity: i.quantity })
                .collect()
        })
        .unwrap_or_default()
}
