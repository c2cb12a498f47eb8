use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{LineItem, Product, StockAdjustment};
use crate::repositories::{ProductCatalog, TransactionStore};

/// Rejects duplicate bookings and inconsistent checkouts before anything is written.
///
/// Checks here are advisory for concurrency: the stores re-enforce appointment
/// uniqueness and stock levels atomically on insert.
#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn TransactionStore>,
    catalog: Arc<dyn ProductCatalog>,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn TransactionStore>, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn check_appointment(&self, doctor_id: Uuid, pet_id: Uuid, date: NaiveDate) -> Result<()> {
        if self.store.active_appointment_exists(doctor_id, pet_id, date).await? {
            return Err(AppError::Conflict(format!(
                "An appointment with doctor {} for pet {} on {} already exists",
                doctor_id, pet_id, date
            )));
        }
        Ok(())
    }

    /// Validates a checkout and returns the stock reservations it needs.
    pub async fn check_order(
        &self,
        items: &[LineItem],
        declared_total: Option<Decimal>,
    ) -> Result<Vec<StockAdjustment>> {
        if items.is_empty() {
            return Err(AppError::Validation("Order must contain at least one item".to_string()));
        }

        let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in items {
            if item.quantity <= 0 {
                return Err(AppError::Validation(format!(
                    "Quantity for product {} must be positive",
                    item.product_id
                )));
            }
            let entry = requested.entry(item.product_id).or_default();
            *entry = entry.checked_add(item.quantity).ok_or_else(|| {
                AppError::Validation(format!("Quantity for product {} is too large", item.product_id))
            })?;
        }

        let ids: Vec<Uuid> = requested.keys().copied().collect();
        let products: HashMap<Uuid, Product> = self
            .catalog
            .find_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for item in items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                AppError::Validation(format!("Product {} not found", item.product_id))
            })?;
            if item.unit_price != product.price {
                return Err(AppError::Validation(format!(
                    "Unit price {} for {} does not match catalog price {}",
                    item.unit_price, product.name, product.price
                )));
            }
        }

        let computed: Decimal = items.iter().map(LineItem::line_total).sum();
        if let Some(declared) = declared_total {
            if declared != computed {
                return Err(AppError::Validation(format!(
                    "Total mismatch: declared {}, computed {}",
                    declared, computed
                )));
            }
        }

        let mut reservations = Vec::with_capacity(requested.len());
        for (product_id, quantity) in requested {
            // presence checked above
            let available = products.get(&product_id).map(|p| p.stock_quantity).unwrap_or(0);
            if quantity > available {
                return Err(AppError::Conflict(format!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product_id, quantity, available
                )));
            }
            reservations.push(StockAdjustment { product_id, quantity });
        }

        Ok(reservations)
    }
}
