pub mod memory;
pub mod outbox_repository;
pub mod product_repository;
pub mod transaction_repository;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{OutboxEvent, OutboxStatus, Product, StockAdjustment, TransactionKind, TransactionRecord};

pub use memory::InMemoryStore;
pub use outbox_repository::OutboxRepository;
pub use product_repository::ProductRepository;
pub use transaction_repository::TransactionRepository;

/// Side effects committed atomically with a record insert, update or delete.
#[derive(Debug, Clone, Default)]
pub struct CommitEffects {
    pub events: Vec<OutboxEvent>,
    /// Decrements that must not take stock below zero.
    pub stock_reservations: Vec<StockAdjustment>,
    pub stock_releases: Vec<StockAdjustment>,
}

impl CommitEffects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: OutboxEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_reservations(mut self, reservations: Vec<StockAdjustment>) -> Self {
        self.stock_reservations = reservations;
        self
    }

    pub fn with_releases(mut self, releases: Vec<StockAdjustment>) -> Self {
        self.stock_releases = releases;
        self
    }
}

/// Listing filter. `None` fields match every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Matches the payer or the counterparty.
    pub participant_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
}

impl TransactionQuery {
    pub fn for_participant(participant_id: Uuid) -> Self {
        Self {
            participant_id: Some(participant_id),
            kind: None,
        }
    }

    pub fn of_kind(mut self, kind: Option<TransactionKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.participant_id.map_or(true, |id| record.is_participant(id))
            && self.kind.map_or(true, |kind| record.kind() == kind)
    }
}

/// Persistence for appointments and orders.
///
/// `update` and `delete` are compare-and-swap on `version`: a mismatch fails
/// with `AppError::StaleRecord` and nothing is written.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with `Conflict` on a duplicate active appointment or insufficient stock.
    async fn insert(&self, record: &TransactionRecord, effects: CommitEffects) -> Result<TransactionRecord>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>>;
    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<TransactionRecord>>;
    async fn active_appointment_exists(&self, doctor_id: Uuid, pet_id: Uuid, date: NaiveDate) -> Result<bool>;
    /// Newest first: appointments by appointment date, orders by placement
    /// date, ties broken by creation time.
    async fn find_matching(&self, query: TransactionQuery) -> Result<Vec<TransactionRecord>>;
    /// Returns the stored record with its version bumped.
    async fn update(
        &self,
        record: &TransactionRecord,
        expected_version: i64,
        effects: CommitEffects,
    ) -> Result<TransactionRecord>;
    async fn delete(&self, id: Uuid, expected_version: i64, effects: CommitEffects) -> Result<()>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest undelivered events first.
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>>;
    async fn mark_delivered(&self, id: Uuid) -> Result<()>;
    /// Records a failed attempt; the event is dead once `max_attempts` is reached.
    async fn mark_failed(&self, id: Uuid, error: &str, max_attempts: i32) -> Result<OutboxStatus>;
    async fn events_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<OutboxEvent>>;
    async fn pending_count(&self) -> Result<i64>;
}
