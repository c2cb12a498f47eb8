use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{OutboxEvent, OutboxStatus};
use crate::repositories::OutboxStore;

const OUTBOX_COLUMNS: &str = "id, transaction_id, recipient_id, event_type, title, body, related_id, related_type, status, attempts, last_error, created_at, delivered_at";

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    transaction_id: Uuid,
    recipient_id: Uuid,
    event_type: String,
    title: String,
    body: String,
    related_id: Uuid,
    related_type: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn into_domain(self) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: self.id,
            transaction_id: self.transaction_id,
            recipient_id: self.recipient_id,
            event_type: self.event_type.parse()?,
            title: self.title,
            body: self.body,
            related_id: self.related_id,
            related_type: self.related_type,
            status: self.status.parse()?,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
        })
    }
}

/// Writes outbox rows inside the caller's database transaction.
pub(crate) async fn insert_events(conn: &mut PgConnection, events: &[OutboxEvent]) -> Result<()> {
    for event in events {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, transaction_id, recipient_id, event_type, title, body, related_id, related_type, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.id)
        .bind(event.transaction_id)
        .bind(event.recipient_id)
        .bind(event.event_type.as_str())
        .bind(&event.title)
        .bind(&event.body)
        .bind(event.related_id)
        .bind(&event.related_type)
        .bind(event.status.as_str())
        .bind(event.attempts)
        .bind(event.created_at)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;
    }
    Ok(())
}

/// PostgreSQL-backed outbox.
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for OutboxRepository {
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {} FROM outbox_events WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT $1",
            OUTBOX_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(OutboxRow::into_domain).collect()
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'DELIVERED', delivered_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Outbox event {} not found", id)));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, max_attempts: i32) -> Result<OutboxStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN attempts + 1 >= $3 THEN 'DEAD' ELSE status END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        status
            .ok_or_else(|| AppError::NotFound(format!("Outbox event {} not found", id)))?
            .parse()
    }

    async fn events_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {} FROM outbox_events WHERE transaction_id = $1 ORDER BY created_at ASC",
            OUTBOX_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(OutboxRow::into_domain).collect()
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = 'PENDING'")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
