use crate::domain::booking::BookingStatus;
use crate::domain::payment::{PaymentRecord, PaymentStatus, RetryEvent};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Relational state of payments and their bookings as seen by the retry flow.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>>;

    async fn record_failure(&self, payment_id: Uuid, event: RetryEvent) -> Result<()>;

    /// Moves a FAILED payment to RETRY_SCHEDULED. Returns false when the
    /// payment is no longer FAILED, so no second retry gets scheduled.
    async fn schedule_retry(
        &self,
        payment_id: Uuid,
        attempt: u32,
        scheduled_at: DateTime<Utc>,
        event: RetryEvent,
    ) -> Result<bool>;

    async fn request_customer_action(&self, payment_id: Uuid, event: RetryEvent) -> Result<()>;

    async fn mark_permanently_failed(&self, payment_id: Uuid, booking_id: Uuid, event: RetryEvent) -> Result<()>;

    /// Claims the scheduled retry `attempt` and moves the payment to
    /// PROCESSING with the new intent. Returns false if that retry is no
    /// longer the scheduled one.
    async fn attach_retry_intent(
        &self,
        payment_id: Uuid,
        attempt: u32,
        intent_id: &str,
        event: RetryEvent,
    ) -> Result<bool>;

    async fn list_failures(&self, limit: i64) -> Result<Vec<PaymentRecord>>;
}

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

const PAYMENT_COLUMNS: &str = r#"
    p.payment_id, p.booking_id, p.amount_minor, p.currency, p.status, p.provider_intent_id,
    b.provider_customer_id, p.next_retry_at, p.next_retry_attempt, p.history, p.updated_at
"#;

fn event_json(event: &RetryEvent) -> Result<serde_json::Value> {
    Ok(serde_json::Value::Array(vec![serde_json::to_value(event)?]))
}

fn map_row(row: &PgRow) -> Result<PaymentRecord> {
    let status: String = row.get("status");
    let history: serde_json::Value = row.get("history");
    let next_retry_attempt: Option<i32> = row.get("next_retry_attempt");

    Ok(PaymentRecord {
        payment_id: row.get("payment_id"),
        booking_id: row.get("booking_id"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        status: PaymentStatus::parse(&status).ok_or_else(|| anyhow!("unknown payment status {}", status))?,
        provider_intent_id: row.get("provider_intent_id"),
        provider_customer_id: row.get("provider_customer_id"),
        next_retry_at: row.get("next_retry_at"),
        next_retry_attempt: next_retry_attempt.and_then(|a| u32::try_from(a).ok()),
        history: serde_json::from_value(history)?,
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn find(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        let sql = format!(
            "SELECT {} FROM payments p JOIN bookings b ON b.booking_id = p.booking_id WHERE p.payment_id = $1",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn record_failure(&self, payment_id: Uuid, event: RetryEvent) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED', next_retry_at = NULL, next_retry_attempt = NULL,
                history = history || $2::jsonb, updated_at = now()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(event_json(&event)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        payment_id: Uuid,
        attempt: u32,
        scheduled_at: DateTime<Utc>,
        event: RetryEvent,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'RETRY_SCHEDULED', next_retry_at = $2, next_retry_attempt = $3,
                history = history || $4::jsonb, updated_at = now()
            WHERE payment_id = $1 AND status = 'FAILED'
            "#,
        )
        .bind(payment_id)
        .bind(scheduled_at)
        .bind(i32::try_from(attempt)?)
        .bind(event_json(&event)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn request_customer_action(&self, payment_id: Uuid, event: RetryEvent) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'REQUIRES_CUSTOMER_ACTION', next_retry_at = NULL, next_retry_attempt = NULL,
                history = history || $2::jsonb, updated_at = now()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(event_json(&event)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_permanently_failed(&self, payment_id: Uuid, booking_id: Uuid, event: RetryEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PERMANENTLY_FAILED', next_retry_at = NULL, next_retry_attempt = NULL,
                history = history || $2::jsonb, updated_at = now()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(event_json(&event)?)
        .execute(tx.as_mut())
        .await?;

        let current: Option<String> = sqlx::query("SELECT status FROM bookings WHERE booking_id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_optional(tx.as_mut())
            .await?
            .map(|r| r.get("status"));

        let next = BookingStatus::PaymentFailed.as_str();
        match current {
            Some(current)
                if BookingStatus::parse(&current).is_some_and(|status| status.mirrors_payment_failure()) =>
            {
                sqlx::query(
                    "UPDATE bookings SET status = $2, payment_status = 'PERMANENTLY_FAILED', updated_at = now() WHERE booking_id = $1",
                )
                .bind(booking_id)
                .bind(next)
                .execute(tx.as_mut())
                .await?;
            }
            Some(current) => {
                tracing::warn!(
                    %booking_id,
                    status = %current,
                    "booking status kept, only payment status marked permanently failed"
                );
                sqlx::query(
                    "UPDATE bookings SET payment_status = 'PERMANENTLY_FAILED', updated_at = now() WHERE booking_id = $1",
                )
                .bind(booking_id)
                .execute(tx.as_mut())
                .await?;
            }
            None => {
                tracing::warn!(%booking_id, "booking not found while marking payment permanently failed");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn attach_retry_intent(
        &self,
        payment_id: Uuid,
        attempt: u32,
        intent_id: &str,
        event: RetryEvent,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PROCESSING', provider_intent_id = $3, next_retry_at = NULL, next_retry_attempt = NULL,
                history = history || $4::jsonb, updated_at = now()
            WHERE payment_id = $1 AND status = 'RETRY_SCHEDULED' AND next_retry_attempt = $2
            "#,
        )
        .bind(payment_id)
        .bind(i32::try_from(attempt)?)
        .bind(intent_id)
        .bind(event_json(&event)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_failures(&self, limit: i64) -> Result<Vec<PaymentRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM payments p JOIN bookings b ON b.booking_id = p.booking_id
            WHERE p.status IN ('FAILED', 'RETRY_SCHEDULED', 'REQUIRES_CUSTOMER_ACTION', 'PERMANENTLY_FAILED')
            ORDER BY p.updated_at DESC
            LIMIT $1
            "#,
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(map_row).collect()
    }
}
