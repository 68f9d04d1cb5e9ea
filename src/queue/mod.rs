use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod store_redis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Payment,
    Notification,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Payment => "payment",
            QueueName::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum Job {
    RetryImmediate {
        payment_id: Uuid,
        booking_id: Uuid,
        attempt: u32,
        reason: String,
    },
    RetryDelayed {
        payment_id: Uuid,
        booking_id: Uuid,
        attempt: u32,
        reason: String,
        provider_error_code: Option<String>,
    },
    FollowUpCustomerAction {
        payment_id: Uuid,
        booking_id: Uuid,
    },
    PaymentPermanentFailure {
        payment_id: Uuid,
        booking_id: Uuid,
        customer_message: String,
        priority: Priority,
    },
    PaymentActionRequired {
        payment_id: Uuid,
        booking_id: Uuid,
        message: String,
        alternative_actions: Vec<crate::retry::classifier::AlternativeAction>,
        priority: Priority,
    },
    PaymentActionReminder {
        payment_id: Uuid,
        booking_id: Uuid,
    },
}

impl Job {
    pub fn queue(&self) -> QueueName {
        match self {
            Job::RetryImmediate { .. } | Job::RetryDelayed { .. } | Job::FollowUpCustomerAction { .. } => {
                QueueName::Payment
            }
            Job::PaymentPermanentFailure { .. }
            | Job::PaymentActionRequired { .. }
            | Job::PaymentActionReminder { .. } => QueueName::Notification,
        }
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            Job::RetryImmediate { .. } => "retry_immediate",
            Job::RetryDelayed { .. } => "retry_delayed",
            Job::FollowUpCustomerAction { .. } => "follow_up_customer_action",
            Job::PaymentPermanentFailure { .. } => "payment_permanent_failure",
            Job::PaymentActionRequired { .. } => "payment_action_required",
            Job::PaymentActionReminder { .. } => "payment_action_reminder",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    pub delay_ms: u64,
}

impl JobOptions {
    pub fn delayed(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub queue: QueueName,
    pub run_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub job: Job,
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn add_job(&self, job: Job, options: JobOptions) -> Result<QueuedJob>;

    /// Claims up to `limit` jobs whose run time has passed. A claimed job is
    /// removed from the queue and is not handed to any other caller.
    async fn take_due(&self, queue: QueueName, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueuedJob>>;
}
