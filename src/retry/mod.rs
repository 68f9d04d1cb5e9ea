use crate::domain::payment::RetryAttempt;
use anyhow::Result;
use uuid::Uuid;

pub mod classifier;
pub mod policy;
pub mod store_redis;

/// Short-lived per-payment record of failed attempts, ordered by attempt.
#[async_trait::async_trait]
pub trait RetryHistoryStore: Send + Sync {
    async fn record(&self, payment_id: Uuid, attempt: &RetryAttempt, ttl_secs: i64) -> Result<()>;

    async fn list(&self, payment_id: Uuid) -> Result<Vec<RetryAttempt>>;

    async fn clear(&self, payment_id: Uuid) -> Result<()>;
}

/// Opaque value proving ownership of a payment lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

/// Mutual exclusion for failure handling and retry execution of one payment.
#[async_trait::async_trait]
pub trait PaymentLocks: Send + Sync {
    /// Returns `None` when another holder owns the lock.
    async fn try_acquire(&self, payment_id: Uuid, ttl_ms: u64) -> Result<Option<LockToken>>;

    async fn release(&self, payment_id: Uuid, token: &LockToken) -> Result<()>;
}
