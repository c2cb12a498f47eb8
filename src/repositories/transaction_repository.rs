use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{TransactionDetails, TransactionKind, TransactionRecord, TransactionStatus};
use crate::repositories::outbox_repository::insert_events;
use crate::repositories::product_repository::{release_stock, reserve_stock};
use crate::repositories::{CommitEffects, TransactionQuery, TransactionStore};

const TRANSACTION_COLUMNS: &str = "id, kind, payer_id, counterparty_id, amount, currency, status, payment_status, gateway_order_id, gateway_payment_id, gateway_signature, details, version, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    kind: String,
    payer_id: Uuid,
    counterparty_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    status: String,
    payment_status: String,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    details: Json<TransactionDetails>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> Result<TransactionRecord> {
        let kind: TransactionKind = self.kind.parse()?;
        let currency = self
            .currency
            .parse()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt currency on {}: {}", self.id, e)))?;

        Ok(TransactionRecord {
            id: self.id,
            payer_id: self.payer_id,
            counterparty_id: self.counterparty_id,
            amount: self.amount,
            currency,
            status: TransactionStatus::parse(kind, &self.status)?,
            payment_status: self.payment_status.parse()?,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            gateway_signature: self.gateway_signature,
            details: self.details.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn appointment_key(record: &TransactionRecord) -> (Option<Uuid>, Option<NaiveDate>) {
    match record.appointment_details() {
        Some(d) => (Some(d.pet_id), Some(d.date)),
        None => (None, None),
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("Duplicate transaction: {}", db.message()))
        }
        _ => AppError::Database(e),
    }
}

/// PostgreSQL-backed transaction store.
#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tells a lost version race apart from a missing row or a changed amount.
    async fn explain_missed_write(&self, record: &TransactionRecord, expected_version: i64) -> AppError {
        let current: std::result::Result<Option<(i64, Decimal)>, sqlx::Error> =
            sqlx::query_as("SELECT version, amount FROM transactions WHERE id = $1")
                .bind(record.id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(format!("Transaction {} not found", record.id)),
            Ok(Some((version, _))) if version != expected_version => AppError::StaleRecord(record.id),
            Ok(Some(_)) => AppError::InvalidTransition(format!(
                "Amount of transaction {} cannot change",
                record.id
            )),
            Err(e) => AppError::Database(e),
        }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn insert(&self, record: &TransactionRecord, effects: CommitEffects) -> Result<TransactionRecord> {
        record.check_consistency()?;
        let (pet_id, appointment_date) = appointment_key(record);

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        reserve_stock(&mut tx, &effects.stock_reservations).await?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (id, kind, payer_id, counterparty_id, amount, currency, status, payment_status, gateway_order_id, gateway_payment_id, gateway_signature, details, pet_id, appointment_date, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(record.id)
        .bind(record.kind().as_str())
        .bind(record.payer_id)
        .bind(record.counterparty_id)
        .bind(record.amount)
        .bind(record.currency.code())
        .bind(record.status.as_str())
        .bind(record.payment_status().as_str())
        .bind(&record.gateway_order_id)
        .bind(&record.gateway_payment_id)
        .bind(&record.gateway_signature)
        .bind(Json(&record.details))
        .bind(pet_id)
        .bind(appointment_date)
        .bind(record.version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        insert_events(&mut tx, &effects.events).await?;
        tx.commit().await.map_err(AppError::Database)?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE gateway_order_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn active_appointment_exists(&self, doctor_id: Uuid, pet_id: Uuid, date: NaiveDate) -> Result<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transactions
                WHERE kind = 'APPOINTMENT'
                  AND counterparty_id = $1
                  AND pet_id = $2
                  AND appointment_date = $3
                  AND status <> 'REJECTED'
                  AND payment_status <> 'FAILED'
            )
            "#,
        )
        .bind(doctor_id)
        .bind(pet_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn find_matching(&self, query: TransactionQuery) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE ($1::uuid IS NULL OR payer_id = $1 OR counterparty_id = $1)
              AND ($2::varchar IS NULL OR kind = $2)
            ORDER BY COALESCE(appointment_date, created_at::date) DESC, created_at DESC
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(query.participant_id)
        .bind(query.kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn update(
        &self,
        record: &TransactionRecord,
        expected_version: i64,
        effects: CommitEffects,
    ) -> Result<TransactionRecord> {
        record.check_consistency()?;
        let (pet_id, appointment_date) = appointment_key(record);

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // amount is never written; the guard only detects callers that changed it
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $2,
                payment_status = $3,
                gateway_order_id = $4,
                gateway_payment_id = $5,
                gateway_signature = $6,
                details = $7,
                pet_id = $8,
                appointment_date = $9,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $10 AND amount = $11
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.payment_status().as_str())
        .bind(&record.gateway_order_id)
        .bind(&record.gateway_payment_id)
        .bind(&record.gateway_signature)
        .bind(Json(&record.details))
        .bind(pet_id)
        .bind(appointment_date)
        .bind(expected_version)
        .bind(record.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(AppError::Database)?;
            return Err(self.explain_missed_write(record, expected_version).await);
        };

        reserve_stock(&mut tx, &effects.stock_reservations).await?;
        release_stock(&mut tx, &effects.stock_releases).await?;
        insert_events(&mut tx, &effects.events).await?;
        tx.commit().await.map_err(AppError::Database)?;

        row.into_domain()
    }

    async fn delete(&self, id: Uuid, expected_version: i64, effects: CommitEffects) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(AppError::Database)?;
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;
            return Err(if exists {
                AppError::StaleRecord(id)
            } else {
                AppError::NotFound(format!("Transaction {} not found", id))
            });
        }

        release_stock(&mut tx, &effects.stock_releases).await?;
        insert_events(&mut tx, &effects.events).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}
