use chrono::NaiveTime;

use crate::error::{AppError, Result};
use crate::models::{
    AppointmentStatus, OrderStatus, PaymentStatus, TransactionKind, TransactionRecord,
    TransactionStatus,
};
use crate::services::signature_verifier::VerifiedPayment;

/// Appointment lifecycle: PENDING -> APPROVED -> COMPLETED, PENDING -> REJECTED.
pub struct AppointmentStateMachine;

impl AppointmentStateMachine {
    pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![AppointmentStatus::Approved, AppointmentStatus::Rejected],
            AppointmentStatus::Approved => vec![AppointmentStatus::Completed],
            AppointmentStatus::Rejected => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }

    pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<AppointmentStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::InvalidTransition(format!(
                "Appointment cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )))
        }
    }
}

/// Order lifecycle: forward-only through fulfilment, CANCELLED from any
/// non-terminal state. Forward steps may be skipped.
pub struct OrderStateMachine;

impl OrderStateMachine {
    const FULFILMENT: [OrderStatus; 6] = [
        OrderStatus::Placed,
        OrderStatus::PaymentConfirmed,
        OrderStatus::Packed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    pub fn valid_transitions(current: OrderStatus) -> Vec<OrderStatus> {
        if current.is_terminal() {
            return vec![];
        }
        let mut next: Vec<OrderStatus> = Self::FULFILMENT
            .iter()
            .copied()
            .filter(|s| *s > current)
            .collect();
        next.push(OrderStatus::Cancelled);
        next
    }

    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: OrderStatus, to: OrderStatus) -> Result<OrderStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::InvalidTransition(format!(
                "Order cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )))
        }
    }
}

/// Result of applying a transition to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record changed and must be committed.
    Applied,
    /// The record was already in the requested state.
    Unchanged,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Applies status and payment transitions to records, enforcing payment gating.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusTransitioner {
    allow_unpaid_approval: bool,
}

impl StatusTransitioner {
    pub fn new(allow_unpaid_approval: bool) -> Self {
        Self { allow_unpaid_approval }
    }

    pub fn approve(
        &self,
        record: &mut TransactionRecord,
        schedule: Option<NaiveTime>,
    ) -> Result<TransitionOutcome> {
        let current = appointment_status(record)?;

        if current == AppointmentStatus::Approved {
            let stored = record.appointment_details().and_then(|d| d.time);
            return match schedule {
                Some(time) if stored != Some(time) => Err(AppError::InvalidTransition(format!(
                    "Appointment {} is already approved with a different schedule",
                    record.id
                ))),
                _ => Ok(TransitionOutcome::Unchanged),
            };
        }

        match record.payment_status {
            PaymentStatus::Success => {}
            PaymentStatus::Pending if self.allow_unpaid_approval => {
                tracing::warn!(transaction_id = %record.id, "Approving appointment with pending payment");
            }
            PaymentStatus::Pending => {
                return Err(AppError::InvalidTransition(format!(
                    "Payment for appointment {} is not confirmed",
                    record.id
                )))
            }
            PaymentStatus::Failed => {
                return Err(AppError::InvalidTransition(format!(
                    "Payment for appointment {} failed",
                    record.id
                )))
            }
        }

        let next = AppointmentStateMachine::transition(current, AppointmentStatus::Approved)?;
        if let (Some(time), Some(details)) = (schedule, record.appointment_details_mut()) {
            details.time = Some(time);
        }
        record.status = TransactionStatus::Appointment(next);
        Ok(TransitionOutcome::Applied)
    }

    pub fn reject(&self, record: &mut TransactionRecord) -> Result<TransitionOutcome> {
        self.move_appointment(record, AppointmentStatus::Rejected)
    }

    pub fn complete(&self, record: &mut TransactionRecord) -> Result<TransitionOutcome> {
        self.move_appointment(record, AppointmentStatus::Completed)
    }

    fn move_appointment(
        &self,
        record: &mut TransactionRecord,
        target: AppointmentStatus,
    ) -> Result<TransitionOutcome> {
        let current = appointment_status(record)?;
        if current == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        let next = AppointmentStateMachine::transition(current, target)?;
        record.status = TransactionStatus::Appointment(next);
        Ok(TransitionOutcome::Applied)
    }

    /// Anything past PLACED other than CANCELLED requires a successful payment.
    pub fn advance_order(
        &self,
        record: &mut TransactionRecord,
        target: OrderStatus,
    ) -> Result<TransitionOutcome> {
        let current = record.order_status().ok_or_else(|| {
            AppError::Validation(format!("Transaction {} is not an order", record.id))
        })?;
        if current == target {
            return Ok(TransitionOutcome::Unchanged);
        }

        let next = OrderStateMachine::transition(current, target)?;
        if next != OrderStatus::Cancelled && !record.is_paid() {
            return Err(AppError::InvalidTransition(format!(
                "Order {} cannot move to {} before payment succeeds",
                record.id,
                next.as_str()
            )));
        }
        record.status = TransactionStatus::Order(next);
        Ok(TransitionOutcome::Applied)
    }

    /// The only path that sets payment SUCCESS. Status is left untouched.
    pub fn apply_verified_payment(
        &self,
        record: &mut TransactionRecord,
        proof: VerifiedPayment,
    ) -> Result<TransitionOutcome> {
        match record.payment_status {
            PaymentStatus::Success => {
                let same = record.gateway_order_id.as_deref() == Some(proof.gateway_order_id())
                    && record.gateway_payment_id.as_deref() == Some(proof.gateway_payment_id());
                return if same {
                    Ok(TransitionOutcome::Unchanged)
                } else {
                    Err(AppError::AlreadyPaid(record.id))
                };
            }
            PaymentStatus::Failed => {
                return Err(AppError::InvalidTransition(format!(
                    "Payment for transaction {} already failed",
                    record.id
                )))
            }
            PaymentStatus::Pending => {}
        }

        let open_order = record.gateway_order_id.as_deref().ok_or_else(|| {
            AppError::InvalidTransition(format!("Transaction {} has no open gateway order", record.id))
        })?;
        if open_order != proof.gateway_order_id() {
            return Err(AppError::Validation(format!(
                "Gateway order {} does not belong to transaction {}",
                proof.gateway_order_id(),
                record.id
            )));
        }
        if record.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Transaction {} is already {}",
                record.id, record.status
            )));
        }

        record.gateway_payment_id = Some(proof.gateway_payment_id().to_string());
        record.gateway_signature = Some(proof.signature().to_string());
        record.payment_status = PaymentStatus::Success;
        Ok(TransitionOutcome::Applied)
    }

    /// Marks payment FAILED. Orders are cancelled as part of the same change.
    pub fn apply_payment_failure(&self, record: &mut TransactionRecord) -> Result<TransitionOutcome> {
        match record.payment_status {
            PaymentStatus::Failed => return Ok(TransitionOutcome::Unchanged),
            PaymentStatus::Success => return Err(AppError::AlreadyPaid(record.id)),
            PaymentStatus::Pending => {}
        }

        if record.kind() == TransactionKind::Order {
            if let Some(current) = record.order_status() {
                if !current.is_terminal() {
                    let next = OrderStateMachine::transition(current, OrderStatus::Cancelled)?;
                    record.status = TransactionStatus::Order(next);
                }
            }
        }
        record.payment_status = PaymentStatus::Failed;
        Ok(TransitionOutcome::Applied)
    }
}

fn appointment_status(record: &TransactionRecord) -> Result<AppointmentStatus> {
    record.appointment_status().ok_or_else(|| {
        AppError::Validation(format!("Transaction {} is not an appointment", record.id))
    })
}
