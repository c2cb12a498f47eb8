use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AppointmentStatus, OutboxEvent, OutboxStatus, PaymentStatus, Product, StockAdjustment,
    TransactionRecord,
};
use crate::repositories::{CommitEffects, OutboxStore, ProductCatalog, TransactionQuery, TransactionStore};

/// Delivered and dead events kept for inspection before the oldest are dropped.
const DEFAULT_SETTLED_HISTORY: usize = 1024;

struct MemoryState {
    transactions: HashMap<Uuid, TransactionRecord>,
    products: HashMap<Uuid, Product>,
    /// Pending events only.
    outbox: Vec<OutboxEvent>,
    settled: VecDeque<OutboxEvent>,
    settled_limit: usize,
}

impl MemoryState {
    fn with_settled_limit(settled_limit: usize) -> Self {
        Self {
            transactions: HashMap::new(),
            products: HashMap::new(),
            outbox: Vec::new(),
            settled: VecDeque::new(),
            settled_limit,
        }
    }

    fn pending_position(&self, id: Uuid) -> Result<usize> {
        self.outbox
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Outbox event {} not found", id)))
    }

    fn settle(&mut self, position: usize) {
        let event = self.outbox.remove(position);
        self.settled.push_back(event);
        while self.settled.len() > self.settled_limit {
            self.settled.pop_front();
        }
    }

    fn is_active_appointment(record: &TransactionRecord, doctor_id: Uuid, pet_id: Uuid, date: NaiveDate) -> bool {
        let Some(details) = record.appointment_details() else {
            return false;
        };
        record.counterparty_id == Some(doctor_id)
            && details.pet_id == pet_id
            && details.date == date
            && record.appointment_status() != Some(AppointmentStatus::Rejected)
            && record.payment_status() != PaymentStatus::Failed
    }

    fn listing_key(record: &TransactionRecord) -> (NaiveDate, DateTime<Utc>) {
        let date = record
            .appointment_details()
            .map_or_else(|| record.created_at.date_naive(), |d| d.date);
        (date, record.created_at)
    }

    fn apply_effects(&mut self, effects: CommitEffects) -> Result<()> {
        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        for adj in &effects.stock_reservations {
            *requested.entry(adj.product_id).or_default() += adj.quantity;
        }
        for (product_id, quantity) in &requested {
            let product = self
                .products
                .get(product_id)
                .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
            if product.stock_quantity < *quantity {
                return Err(AppError::Conflict(format!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product_id, quantity, product.stock_quantity
                )));
            }
        }

        for (product_id, quantity) in requested {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock_quantity -= quantity;
            }
        }
        for StockAdjustment { product_id, quantity } in effects.stock_releases {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock_quantity += quantity;
            }
        }
        self.outbox.extend(effects.events);
        Ok(())
    }

    fn check_version(&self, id: Uuid, expected_version: i64) -> Result<&TransactionRecord> {
        let existing = self
            .transactions
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;
        if existing.version != expected_version {
            return Err(AppError::StaleRecord(id));
        }
        Ok(existing)
    }
}

/// Process-local store backing all persistence traits with one lock, so each
/// commit is atomic across records, stock and outbox.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_settled_history(DEFAULT_SETTLED_HISTORY)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` delivered or dead events; pending events are never dropped.
    pub fn with_settled_history(limit: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::with_settled_limit(limit))),
        }
    }

    pub async fn add_product(&self, product: Product) {
        let mut state = self.state.write().await;
        state.products.insert(product.id, product);
    }

    pub async fn stock_of(&self, product_id: Uuid) -> Option<i32> {
        let state = self.state.read().await;
        state.products.get(&product_id).map(|p| p.stock_quantity)
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert(&self, record: &TransactionRecord, effects: CommitEffects) -> Result<TransactionRecord> {
        record.check_consistency()?;
        let mut state = self.state.write().await;

        if state.transactions.contains_key(&record.id) {
            return Err(AppError::Conflict(format!("Transaction {} already exists", record.id)));
        }
        if let (Some(doctor_id), Some(details)) = (record.counterparty_id, record.appointment_details()) {
            let duplicate = state
                .transactions
                .values()
                .any(|r| MemoryState::is_active_appointment(r, doctor_id, details.pet_id, details.date));
            if duplicate {
                return Err(AppError::Conflict(format!(
                    "Doctor {} already has an appointment for pet {} on {}",
                    doctor_id, details.pet_id, details.date
                )));
            }
        }

        state.apply_effects(effects)?;
        state.transactions.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|r| r.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn active_appointment_exists(&self, doctor_id: Uuid, pet_id: Uuid, date: NaiveDate) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .any(|r| MemoryState::is_active_appointment(r, doctor_id, pet_id, date)))
    }

    async fn find_matching(&self, query: TransactionQuery) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<TransactionRecord> = state
            .transactions
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| MemoryState::listing_key(b).cmp(&MemoryState::listing_key(a)));
        Ok(records)
    }

    async fn update(
        &self,
        record: &TransactionRecord,
        expected_version: i64,
        effects: CommitEffects,
    ) -> Result<TransactionRecord> {
        record.check_consistency()?;
        let mut state = self.state.write().await;

        let existing = state.check_version(record.id, expected_version)?;
        if existing.amount != record.amount {
            return Err(AppError::InvalidTransition(format!(
                "Amount of transaction {} cannot change",
                record.id
            )));
        }

        state.apply_effects(effects)?;
        let mut stored = record.clone();
        stored.version = expected_version + 1;
        stored.updated_at = Utc::now();
        state.transactions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: Uuid, expected_version: i64, effects: CommitEffects) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_version(id, expected_version)?;
        state.apply_effects(effects)?;
        state.transactions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.get(&id).cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let mut pending: Vec<OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.settled.iter().any(|e| e.id == id && e.status == OutboxStatus::Delivered) {
            return Ok(());
        }
        let position = state.pending_position(id)?;
        let event = &mut state.outbox[position];
        event.status = OutboxStatus::Delivered;
        event.delivered_at = Some(Utc::now());
        state.settle(position);
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, max_attempts: i32) -> Result<OutboxStatus> {
        let mut state = self.state.write().await;
        let position = state.pending_position(id)?;
        let event = &mut state.outbox[position];
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        if event.attempts >= max_attempts {
            event.status = OutboxStatus::Dead;
        }
        let status = event.status;
        if status == OutboxStatus::Dead {
            state.settle(position);
        }
        Ok(status)
    }

    async fn events_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<OutboxEvent> = state
            .settled
            .iter()
            .chain(state.outbox.iter())
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn pending_count(&self) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.outbox.iter().filter(|e| e.status == OutboxStatus::Pending).count() as i64)
    }
}
