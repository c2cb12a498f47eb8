pub mod actor;
pub mod currency;
pub mod notification;
pub mod product;
pub mod transaction;

pub use actor::{Actor, ActorRole};
pub use currency::{Currency, CurrencyParseError};
pub use notification::{NotificationType, OutboxEvent, OutboxStatus};
pub use product::{Product, StockAdjustment};
pub use transaction::{
    AppointmentDetails, AppointmentStatus, LineItem, OrderDetails, OrderStatus, PaymentStatus,
    TransactionDetails, TransactionKind, TransactionRecord, TransactionStatus,
};
