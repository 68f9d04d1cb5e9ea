use crate::queue::{Job, JobOptions, JobQueue, QueueName, QueuedJob};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use uuid::Uuid;

/// Jobs live in one sorted set per queue, scored by run-at epoch millis.
#[derive(Clone)]
pub struct RedisJobQueue {
    pub client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn queue_key(queue: QueueName) -> String {
        format!("jobs:{}", queue.as_str())
    }
}

#[async_trait::async_trait]
impl JobQueue for RedisJobQueue {
    async fn add_job(&self, job: Job, options: JobOptions) -> Result<QueuedJob> {
        let now = Utc::now();
        let run_at = i64::try_from(options.delay_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| anyhow!("job delay of {}ms is out of range", options.delay_ms))?;
        let queued = QueuedJob {
            id: Uuid::new_v4(),
            queue: job.queue(),
            run_at,
            enqueued_at: now,
            job,
        };

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&queued)?;
        let _: i64 = conn
            .zadd(Self::queue_key(queued.queue), payload, queued.run_at.timestamp_millis())
            .await?;

        tracing::debug!(
            job_id = %queued.id,
            queue = queued.queue.as_str(),
            job_type = queued.job.job_type(),
            delay_ms = options.delay_ms,
            "job enqueued"
        );
        Ok(queued)
    }

    async fn take_due(&self, queue: QueueName, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueuedJob>> {
        let key = Self::queue_key(queue);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let due: Vec<String> = conn
            .zrangebyscore_limit(&key, "-inf", now.timestamp_millis(), 0, limit as isize)
            .await?;

        let mut claimed = Vec::with_capacity(due.len());
        for payload in due {
            let removed: i64 = conn.zrem(&key, &payload).await?;
            if removed == 0 {
                // another worker got there first
                continue;
            }
            match serde_json::from_str::<QueuedJob>(&payload) {
                Ok(job) => claimed.push(job),
                Err(e) => tracing::warn!("dropping unreadable job on {}: {}", key, e),
            }
        }

        Ok(claimed)
    }
}
