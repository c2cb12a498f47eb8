use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Marketplace product as seen by checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock_quantity: i32,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Decimal, stock_quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            stock_quantity,
        }
    }
}

/// Stock movement applied atomically with a transaction commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub quantity: i32,
}
