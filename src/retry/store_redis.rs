use crate::domain::payment::RetryAttempt;
use crate::retry::{LockToken, PaymentLocks, RetryHistoryStore};
use anyhow::Result;
use redis::AsyncCommands;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RetryHistoryRedis {
    pub client: redis::Client,
}

impl RetryHistoryRedis {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn history_key(payment_id: Uuid) -> String {
        format!("payment_retry:{}", payment_id)
    }
}

#[async_trait::async_trait]
impl RetryHistoryStore for RetryHistoryRedis {
    async fn record(&self, payment_id: Uuid, attempt: &RetryAttempt, ttl_secs: i64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::history_key(payment_id);
        let member = serde_json::to_string(attempt)?;
        let _: i64 = conn.zadd(&key, member, attempt.attempt).await?;
        let _: bool = conn.expire(&key, ttl_secs).await?;
        Ok(())
    }

    async fn list(&self, payment_id: Uuid) -> Result<Vec<RetryAttempt>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let entries: Vec<String> = conn.zrange(Self::history_key(payment_id), 0, -1).await?;

        // Entries that no longer parse are dropped rather than failing the read.
        Ok(entries
            .iter()
            .filter_map(|e| serde_json::from_str::<RetryAttempt>(e).ok())
            .collect())
    }

    async fn clear(&self, payment_id: Uuid) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: usize = conn.del(Self::history_key(payment_id)).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PaymentLockRedis {
    pub client: redis::Client,
}

impl PaymentLockRedis {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn lock_key(payment_id: Uuid) -> String {
        format!("payment_retry:lock:{}", payment_id)
    }
}

#[async_trait::async_trait]
impl PaymentLocks for PaymentLockRedis {
    async fn try_acquire(&self, payment_id: Uuid, ttl_ms: u64) -> Result<Option<LockToken>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4().to_string();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(payment_id))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| LockToken(token)))
    }

    async fn release(&self, payment_id: Uuid, token: &LockToken) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(Self::lock_key(payment_id))
            .arg(&token.0)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
