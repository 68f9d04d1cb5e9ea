use crate::queue::{Job, JobQueue, QueueName, QueuedJob};
use crate::service::retry_service::{PaymentRetryService, RetryRequest};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

/// Drains due jobs from the payment queue. Notification jobs are left for
/// the notification service.
#[derive(Clone)]
pub struct RetryWorker {
    pub service: PaymentRetryService,
    pub queue: Arc<dyn JobQueue>,
    pub batch_size: usize,
    pub poll_interval: std::time::Duration,
}

impl RetryWorker {
    pub async fn run(self) {
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!("retry worker error: {:#}", err);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Processes one batch and returns how many jobs were handled.
    pub async fn tick(&self) -> Result<usize> {
        let batch = self
            .queue
            .take_due(QueueName::Payment, Utc::now(), self.batch_size)
            .await?;

        let count = batch.len();
        for item in batch {
            self.dispatch(item).await;
        }
        Ok(count)
    }

    async fn dispatch(&self, item: QueuedJob) {
        let job_type = item.job.job_type();
        match item.job {
            Job::RetryImmediate {
                payment_id,
                booking_id,
                attempt,
                reason,
            }
            | Job::RetryDelayed {
                payment_id,
                booking_id,
                attempt,
                reason,
                ..
            } => {
                let result = self
                    .service
                    .execute_payment_retry(RetryRequest {
                        payment_id,
                        booking_id,
                        attempt,
                        original_reason: Some(reason),
                    })
                    .await;
                tracing::info!(
                    job_id = %item.id,
                    job_type,
                    %payment_id,
                    attempt,
                    success = result.success,
                    skipped = result.skipped,
                    deferred = result.deferred,
                    "retry job processed"
                );
            }
            Job::FollowUpCustomerAction { payment_id, booking_id } => {
                if let Err(e) = self.service.follow_up_customer_action(payment_id, booking_id).await {
                    tracing::error!(job_id = %item.id, %payment_id, "customer follow-up failed: {:#}", e);
                }
            }
            other => {
                tracing::warn!(job_id = %item.id, "unexpected {} job on payment queue", other.job_type());
            }
        }
    }
}
