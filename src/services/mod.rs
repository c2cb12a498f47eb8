pub mod amount_converter;
pub mod conflict_checker;
pub mod gateway_order_creator;
pub mod signature_verifier;
pub mod state_machine;
pub mod transaction_service;

pub use amount_converter::AmountConverter;
pub use conflict_checker::ConflictChecker;
pub use gateway_order_creator::{GatewayOrderCreator, GatewayOrderPayload};
pub use signature_verifier::{SignatureVerifier, VerifiedPayment};
pub use state_machine::{AppointmentStateMachine, OrderStateMachine, StatusTransitioner, TransitionOutcome};
pub use transaction_service::{
    BookAppointment, Checkout, OrderStatusMetadata, PaymentCallback, PendingTransactionRequest,
    ServiceConfig, TransactionService,
};
