use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Which lifecycle a record follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Appointment,
    Order,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Appointment => "APPOINTMENT",
            TransactionKind::Order => "ORDER",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "APPOINTMENT" => Ok(TransactionKind::Appointment),
            "ORDER" => Ok(TransactionKind::Order),
            other => Err(AppError::Validation(format!("Unknown transaction kind: {}", other))),
        }
    }
}

/// Lifecycle of a veterinary appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Rejected | AppointmentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Approved => "APPROVED",
            AppointmentStatus::Rejected => "REJECTED",
            AppointmentStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(AppointmentStatus::Pending),
            "APPROVED" => Ok(AppointmentStatus::Approved),
            "REJECTED" => Ok(AppointmentStatus::Rejected),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            other => Err(AppError::Validation(format!("Unknown appointment status: {}", other))),
        }
    }
}

/// Lifecycle of a marketplace order, declared in fulfilment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    PaymentConfirmed,
    Packed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            OrderStatus::Packed => "PACKED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Customer-facing line sent with a status update.
    pub fn customer_message(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "Your order has been placed.",
            OrderStatus::PaymentConfirmed => {
                "Your payment has been confirmed. We are preparing your order."
            }
            OrderStatus::Packed => "Your order has been packed and is ready for shipment.",
            OrderStatus::Shipped => "Your order has been shipped and is on its way!",
            OrderStatus::OutForDelivery => {
                "Your order is out for delivery. You should receive it soon!"
            }
            OrderStatus::Delivered => "Your order has been delivered. Thank you for shopping with us!",
            OrderStatus::Cancelled => "Your order has been cancelled.",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PLACED" => Ok(OrderStatus::Placed),
            "PAYMENT_CONFIRMED" => Ok(OrderStatus::PaymentConfirmed),
            "PACKED" => Ok(OrderStatus::Packed),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "OUT_FOR_DELIVERY" => Ok(OrderStatus::OutForDelivery),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::Validation(format!("Unknown order status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(AppError::Validation(format!("Unknown payment status: {}", other))),
        }
    }
}

/// Kind-specific status. The two vocabularies never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionStatus {
    Appointment(AppointmentStatus),
    Order(OrderStatus),
}

impl TransactionStatus {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionStatus::Appointment(_) => TransactionKind::Appointment,
            TransactionStatus::Order(_) => TransactionKind::Order,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            TransactionStatus::Appointment(s) => s.is_terminal(),
            TransactionStatus::Order(s) => s.is_terminal(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Appointment(s) => s.as_str(),
            TransactionStatus::Order(s) => s.as_str(),
        }
    }

    pub fn parse(kind: TransactionKind, value: &str) -> Result<Self> {
        match kind {
            TransactionKind::Appointment => value.parse().map(TransactionStatus::Appointment),
            TransactionKind::Order => value.parse().map(TransactionStatus::Order),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub pet_id: Uuid,
    pub date: NaiveDate,
    /// Assigned by the doctor on approval, or the customer's preference before that.
    pub time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub items: Vec<LineItem>,
    pub shipping_address: String,
    pub expected_delivery_date: Option<NaiveDate>,
}

impl OrderDetails {
    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDetails {
    Appointment(AppointmentDetails),
    Order(OrderDetails),
}

/// A payment-gated appointment or order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub payer_id: Uuid,
    /// The doctor for an appointment; orders have none.
    pub counterparty_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    /// Moves to `Success` only through a verified gateway callback.
    pub(crate) payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub details: TransactionDetails,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decimal places the `amount` and `price` columns hold.
pub const STORED_AMOUNT_SCALE: u32 = 4;

fn exceeds_stored_scale(amount: Decimal) -> bool {
    amount.normalize().scale() > STORED_AMOUNT_SCALE
}

impl TransactionRecord {
    pub fn new_appointment(
        payer_id: Uuid,
        doctor_id: Uuid,
        fee: Decimal,
        currency: Currency,
        details: AppointmentDetails,
    ) -> Result<Self> {
        if fee <= Decimal::ZERO {
            return Err(AppError::AmountInvalid(format!("Appointment fee must be positive, got {}", fee)));
        }
        if exceeds_stored_scale(fee) {
            return Err(AppError::AmountInvalid(format!(
                "Appointment fee {} has more than {} decimal places",
                fee, STORED_AMOUNT_SCALE
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            payer_id,
            counterparty_id: Some(doctor_id),
            amount: fee,
            currency,
            status: TransactionStatus::Appointment(AppointmentStatus::Pending),
            payment_status: PaymentStatus::Pending,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            details: TransactionDetails::Appointment(details),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Builds an order whose amount is the sum of its line items.
    pub fn new_order(payer_id: Uuid, currency: Currency, details: OrderDetails) -> Result<Self> {
        if details.items.is_empty() {
            return Err(AppError::Validation("Order must contain at least one item".to_string()));
        }
        for item in &details.items {
            if item.quantity <= 0 {
                return Err(AppError::Validation(format!(
                    "Quantity for product {} must be positive",
                    item.product_id
                )));
            }
            if item.unit_price <= Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "Unit price for product {} must be positive",
                    item.product_id
                )));
            }
            if exceeds_stored_scale(item.unit_price) {
                return Err(AppError::AmountInvalid(format!(
                    "Unit price {} for product {} has more than {} decimal places",
                    item.unit_price, item.product_id, STORED_AMOUNT_SCALE
                )));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            payer_id,
            counterparty_id: None,
            amount: details.computed_total(),
            currency,
            status: TransactionStatus::Order(OrderStatus::Placed),
            payment_status: PaymentStatus::Pending,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            details: TransactionDetails::Order(details),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Success
    }

    pub fn kind(&self) -> TransactionKind {
        self.status.kind()
    }

    pub fn appointment_status(&self) -> Option<AppointmentStatus> {
        match self.status {
            TransactionStatus::Appointment(s) => Some(s),
            TransactionStatus::Order(_) => None,
        }
    }

    pub fn order_status(&self) -> Option<OrderStatus> {
        match self.status {
            TransactionStatus::Order(s) => Some(s),
            TransactionStatus::Appointment(_) => None,
        }
    }

    pub fn appointment_details(&self) -> Option<&AppointmentDetails> {
        match &self.details {
            TransactionDetails::Appointment(d) => Some(d),
            TransactionDetails::Order(_) => None,
        }
    }

    pub fn appointment_details_mut(&mut self) -> Option<&mut AppointmentDetails> {
        match &mut self.details {
            TransactionDetails::Appointment(d) => Some(d),
            TransactionDetails::Order(_) => None,
        }
    }

    pub fn order_details(&self) -> Option<&OrderDetails> {
        match &self.details {
            TransactionDetails::Order(d) => Some(d),
            TransactionDetails::Appointment(_) => None,
        }
    }

    pub fn order_details_mut(&mut self) -> Option<&mut OrderDetails> {
        match &mut self.details {
            TransactionDetails::Order(d) => Some(d),
            TransactionDetails::Appointment(_) => None,
        }
    }

    /// The gateway order id while that order has not been settled either way.
    pub fn open_gateway_order_id(&self) -> Option<&str> {
        match self.payment_status {
            PaymentStatus::Pending => self.gateway_order_id.as_deref(),
            PaymentStatus::Success | PaymentStatus::Failed => None,
        }
    }

    /// Deterministic receipt key the gateway uses to deduplicate order creation.
    pub fn receipt_key(&self) -> String {
        let prefix = match self.kind() {
            TransactionKind::Appointment => "appt",
            TransactionKind::Order => "order",
        };
        format!("{}_{}", prefix, self.id.simple())
    }

    pub fn is_participant(&self, actor_id: Uuid) -> bool {
        self.payer_id == actor_id || self.counterparty_id == Some(actor_id)
    }

    /// Checks that kind, status and details agree and that order totals add up.
    pub fn check_consistency(&self) -> Result<()> {
        match (&self.status, &self.details) {
            (TransactionStatus::Appointment(_), TransactionDetails::Appointment(_)) => {
                if self.counterparty_id.is_none() {
                    return Err(AppError::Validation(format!(
                        "Appointment {} has no doctor",
                        self.id
                    )));
                }
            }
            (TransactionStatus::Order(_), TransactionDetails::Order(order)) => {
                let computed = order.computed_total();
                if computed != self.amount {
                    return Err(AppError::Validation(format!(
                        "Total mismatch for order {}: items sum to {}, amount is {}",
                        self.id, computed, self.amount
                    )));
                }
            }
            _ => {
                return Err(AppError::Validation(format!(
                    "Transaction {} has details that do not match its kind",
                    self.id
                )))
            }
        }
        if self.amount <= Decimal::ZERO {
            return Err(AppError::AmountInvalid(format!(
                "Transaction {} has non-positive amount {}",
                self.id, self.amount
            )));
        }
        if exceeds_stored_scale(self.amount) {
            return Err(AppError::AmountInvalid(format!(
                "Transaction {} amount {} cannot be stored without rounding",
                self.id, self.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn appointment_details() -> AppointmentDetails {
        AppointmentDetails {
            pet_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            time: None,
            reason: Some("Vaccination".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_new_appointment_starts_pending() {
        let record = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(500.00),
            Currency::INR,
            appointment_details(),
        )
        .unwrap();

        assert_eq!(record.appointment_status(), Some(AppointmentStatus::Pending));
        assert_eq!(record.payment_status(), PaymentStatus::Pending);
        assert!(record.gateway_order_id.is_none());
        assert!(record.check_consistency().is_ok());
    }

    #[test]
    fn test_new_appointment_rejects_zero_fee() {
        let result = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::ZERO,
            Currency::INR,
            appointment_details(),
        );
        assert!(matches!(result, Err(AppError::AmountInvalid(_))));
    }

    #[test]
    fn test_amounts_finer_than_stored_scale_are_rejected() {
        let fee = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(500.00001),
            Currency::INR,
            appointment_details(),
        );
        assert!(matches!(fee, Err(AppError::AmountInvalid(_))));

        let trailing_zeros = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(500.000000),
            Currency::INR,
            appointment_details(),
        );
        assert!(trailing_zeros.is_ok());

        let order = TransactionRecord::new_order(
            Uuid::new_v4(),
            Currency::INR,
            OrderDetails {
                items: vec![LineItem { product_id: Uuid::new_v4(), quantity: 1, unit_price: dec!(19.99999) }],
                shipping_address: "12 Park Street".to_string(),
                expected_delivery_date: None,
            },
        );
        assert!(matches!(order, Err(AppError::AmountInvalid(_))));
    }

    #[test]
    fn test_new_order_amount_is_sum_of_lines() {
        let details = OrderDetails {
            items: vec![
                LineItem { product_id: Uuid::new_v4(), quantity: 2, unit_price: dec!(149.50) },
                LineItem { product_id: Uuid::new_v4(), quantity: 1, unit_price: dec!(99.00) },
            ],
            shipping_address: "12 MG Road, Pune".to_string(),
            expected_delivery_date: None,
        };
        let record = TransactionRecord::new_order(Uuid::new_v4(), Currency::INR, details).unwrap();

        assert_eq!(record.amount, dec!(398.00));
        assert_eq!(record.order_status(), Some(OrderStatus::Placed));
        assert!(record.check_consistency().is_ok());
    }

    #[test]
    fn test_tampered_order_amount_fails_consistency() {
        let details = OrderDetails {
            items: vec![LineItem { product_id: Uuid::new_v4(), quantity: 3, unit_price: dec!(10) }],
            shipping_address: "Somewhere".to_string(),
            expected_delivery_date: None,
        };
        let mut record = TransactionRecord::new_order(Uuid::new_v4(), Currency::INR, details).unwrap();
        record.amount = dec!(29.99);

        assert!(matches!(record.check_consistency(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_open_gateway_order_only_while_payment_pending() {
        let mut record = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(500.00),
            Currency::INR,
            appointment_details(),
        )
        .unwrap();
        assert_eq!(record.open_gateway_order_id(), None);

        record.gateway_order_id = Some("order_abc".to_string());
        assert_eq!(record.open_gateway_order_id(), Some("order_abc"));

        record.payment_status = PaymentStatus::Failed;
        assert_eq!(record.open_gateway_order_id(), None);
    }

    #[test]
    fn test_receipt_key_fits_gateway_limit() {
        let record = TransactionRecord::new_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(1),
            Currency::INR,
            appointment_details(),
        )
        .unwrap();
        let key = record.receipt_key();

        assert!(key.starts_with("appt_"));
        assert!(key.len() <= 40);
        assert_eq!(key, record.receipt_key());
    }

    #[test]
    fn test_status_serializes_without_kind_tag() {
        let status = TransactionStatus::Order(OrderStatus::OutForDelivery);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"OUT_FOR_DELIVERY\"");

        let parsed: TransactionStatus = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(parsed, TransactionStatus::Appointment(AppointmentStatus::Approved));
    }

    #[test]
    fn test_order_status_ordering_follows_fulfilment() {
        assert!(OrderStatus::Placed < OrderStatus::PaymentConfirmed);
        assert!(OrderStatus::Shipped < OrderStatus::Delivered);
    }
}
