use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Product, StockAdjustment};
use crate::repositories::ProductCatalog;

/// Decrements stock for every reservation, failing the whole unit of work
/// when any product would go below zero.
pub(crate) async fn reserve_stock(conn: &mut PgConnection, reservations: &[StockAdjustment]) -> Result<()> {
    // Aggregate per product; BTreeMap keeps lock order stable across writers.
    let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
    for adj in reservations {
        *requested.entry(adj.product_id).or_default() += adj.quantity;
    }

    for (product_id, quantity) in requested {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity - $2 WHERE id = $1 AND stock_quantity >= $2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Insufficient stock for product {}: requested {}",
                product_id, quantity
            )));
        }
    }
    Ok(())
}

pub(crate) async fn release_stock(conn: &mut PgConnection, releases: &[StockAdjustment]) -> Result<()> {
    for adj in releases {
        sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $2 WHERE id = $1")
            .bind(adj.product_id)
            .bind(adj.quantity)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;
    }
    Ok(())
}

/// PostgreSQL-backed product catalog.
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, product: &Product) -> Result<Product> {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, name, price, stock_quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, price, stock_quantity
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock_quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)
    }
}

#[async_trait]
impl ProductCatalog for ProductRepository {
    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        sqlx::query_as::<_, Product>(
            "SELECT id, name, price, stock_quantity FROM products WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>("SELECT id, name, price, stock_quantity FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
