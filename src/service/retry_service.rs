use crate::domain::payment::{PaymentRecord, PaymentStatus, RetryAttempt, RetryEvent};
use crate::error::RetryError;
use crate::gateways::{retry_idempotency_key, IntentRequest, IntentStatus, PaymentProvider, ProviderError};
use crate::queue::{Job, JobOptions, JobQueue, Priority};
use crate::repo::payments_repo::PaymentStore;
use crate::retry::classifier::{analyze_payment_failure, FailureAnalysis};
use crate::retry::policy::RetryConfig;
use crate::retry::{LockToken, PaymentLocks, RetryHistoryStore};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const MSG_INTERNAL: &str = "We encountered an error processing your payment. Our team has been notified.";
const MSG_EXHAUSTED: &str = "Payment could not be processed after multiple attempts. Please contact support.";
const MSG_IN_PROGRESS: &str = "Your payment is already being processed.";
const MSG_CLOSED: &str = "This payment no longer needs attention.";

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailure {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub failure_reason: String,
    pub provider_error_code: Option<String>,
    pub attempt_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    RetryScheduled,
    RetryImmediate,
    CustomerActionRequired,
    PermanentFailure,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureOutcome {
    pub success: bool,
    pub action: FailureAction,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub customer_message: String,
}

impl FailureOutcome {
    fn done(action: FailureAction, customer_message: &str) -> Self {
        Self {
            success: true,
            action,
            next_retry_at: None,
            customer_message: customer_message.to_string(),
        }
    }

    fn skipped(customer_message: &str) -> Self {
        Self {
            success: false,
            action: FailureAction::Skipped,
            next_retry_at: None,
            customer_message: customer_message.to_string(),
        }
    }

    fn internal_error() -> Self {
        Self {
            success: false,
            action: FailureAction::PermanentFailure,
            next_retry_at: None,
            customer_message: MSG_INTERNAL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryRequest {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub attempt: u32,
    pub original_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryExecution {
    pub success: bool,
    pub new_intent_id: Option<String>,
    pub requires_action: bool,
    pub skipped: bool,
    /// Put back on the payment queue to run again later.
    pub deferred: bool,
    pub error: Option<String>,
}

impl RetryExecution {
    fn skipped(reason: &str) -> Self {
        Self {
            skipped: true,
            error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    fn failed(error: String) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryStatus {
    pub current_status: PaymentStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub retry_history: Vec<RetryAttempt>,
    pub can_retry: bool,
}

/// Classifies payment failures, schedules retries through the job queue and
/// executes them when the queue hands them back.
///
/// Every entry point that mutates a payment runs under the per-payment lock.
#[derive(Clone)]
pub struct PaymentRetryService {
    pub config: RetryConfig,
    pub payments: Arc<dyn PaymentStore>,
    pub history: Arc<dyn RetryHistoryStore>,
    pub locks: Arc<dyn PaymentLocks>,
    pub queue: Arc<dyn JobQueue>,
    pub provider: Arc<dyn PaymentProvider>,
}

impl PaymentRetryService {
    pub async fn handle_payment_failure(&self, failure: PaymentFailure) -> FailureOutcome {
        let attempt = failure.attempt_number.unwrap_or(1).max(1);

        let token = match self.locks.try_acquire(failure.payment_id, self.config.lock_ttl_ms).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!(payment_id = %failure.payment_id, attempt, "failure already being handled");
                return FailureOutcome::skipped(MSG_IN_PROGRESS);
            }
            Err(e) => {
                tracing::error!(payment_id = %failure.payment_id, "payment lock unavailable: {:#}", e);
                return FailureOutcome::internal_error();
            }
        };

        let outcome = match self.handle_failure_locked(&failure, attempt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    payment_id = %failure.payment_id,
                    booking_id = %failure.booking_id,
                    attempt,
                    "payment failure handling failed: {:#}",
                    e
                );
                FailureOutcome::internal_error()
            }
        };

        self.release(failure.payment_id, &token).await;
        outcome
    }

    async fn handle_failure_locked(&self, failure: &PaymentFailure, attempt: u32) -> Result<FailureOutcome> {
        let payment = self.load(failure.payment_id, failure.booking_id).await?;
        if payment.status.is_terminal() {
            tracing::info!(
                payment_id = %payment.payment_id,
                status = payment.status.as_str(),
                "ignoring failure for closed payment"
            );
            return Ok(FailureOutcome::skipped(MSG_CLOSED));
        }

        let analysis = analyze_payment_failure(
            &self.config,
            &failure.failure_reason,
            failure.provider_error_code.as_deref(),
            attempt,
        );
        let now = Utc::now();
        self.record_failure(failure, attempt, &analysis, now).await?;

        if !analysis.is_retryable || attempt >= self.config.max_retries {
            self.mark_permanent_failure(
                &payment,
                &analysis.customer_message,
                attempt >= self.config.max_retries,
            )
            .await?;
            return Ok(FailureOutcome::done(FailureAction::PermanentFailure, &analysis.customer_message));
        }

        if analysis.requires_customer_action {
            self.request_customer_action(&payment, &analysis, now).await?;
            return Ok(FailureOutcome::done(
                FailureAction::CustomerActionRequired,
                &analysis.customer_message,
            ));
        }

        let next_attempt = attempt + 1;
        let scheduled_at = i64::try_from(analysis.retry_delay_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| anyhow!("retry delay of {}ms is out of range", analysis.retry_delay_ms))?;

        let event = RetryEvent::RetryScheduled {
            attempt: next_attempt,
            scheduled_at,
            reason: failure.failure_reason.clone(),
            provider_error_code: failure.provider_error_code.clone(),
        };
        if !self
            .payments
            .schedule_retry(payment.payment_id, next_attempt, scheduled_at, event)
            .await?
        {
            tracing::warn!(payment_id = %payment.payment_id, "payment changed state before retry could be scheduled");
            return Ok(FailureOutcome::skipped(MSG_IN_PROGRESS));
        }

        let (job, options, action) = if analysis.retry_delay_ms == 0 {
            let job = Job::RetryImmediate {
                payment_id: payment.payment_id,
                booking_id: payment.booking_id,
                attempt: next_attempt,
                reason: failure.failure_reason.clone(),
            };
            (job, JobOptions::default(), FailureAction::RetryImmediate)
        } else {
            let job = Job::RetryDelayed {
                payment_id: payment.payment_id,
                booking_id: payment.booking_id,
                attempt: next_attempt,
                reason: failure.failure_reason.clone(),
                provider_error_code: failure.provider_error_code.clone(),
            };
            (job, JobOptions::delayed(analysis.retry_delay_ms), FailureAction::RetryScheduled)
        };
        if let Err(e) = self.queue.add_job(job, options).await {
            // the row says RETRY_SCHEDULED but nothing would ever run it
            tracing::error!(
                payment_id = %payment.payment_id,
                attempt = next_attempt,
                "retry job not enqueued, failing payment: {:#}",
                e
            );
            self.mark_permanent_failure(&payment, MSG_INTERNAL, false).await?;
            return Ok(FailureOutcome::internal_error());
        }

        tracing::info!(
            payment_id = %payment.payment_id,
            booking_id = %payment.booking_id,
            attempt = next_attempt,
            scheduled_at = %scheduled_at,
            delay_ms = analysis.retry_delay_ms,
            "payment retry scheduled"
        );

        Ok(FailureOutcome {
            success: true,
            action,
            next_retry_at: (action == FailureAction::RetryScheduled).then_some(scheduled_at),
            customer_message: analysis.customer_message,
        })
    }

    async fn load(&self, payment_id: Uuid, booking_id: Uuid) -> Result<PaymentRecord> {
        let payment = self
            .payments
            .find(payment_id)
            .await?
            .ok_or_else(|| anyhow!("payment {} not found", payment_id))?;
        if payment.booking_id != booking_id {
            return Err(anyhow!(
                "payment {} belongs to booking {}, not {}",
                payment_id,
                payment.booking_id,
                booking_id
            ));
        }
        Ok(payment)
    }

    async fn record_failure(
        &self,
        failure: &PaymentFailure,
        attempt: u32,
        analysis: &FailureAnalysis,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let event = RetryEvent::FailureRecorded {
            attempt,
            reason: failure.failure_reason.clone(),
            provider_error_code: failure.provider_error_code.clone(),
            analysis: analysis.clone(),
            at: now,
        };
        self.payments.record_failure(failure.payment_id, event).await?;

        let entry = RetryAttempt {
            attempt,
            recorded_at: now,
            reason: failure.failure_reason.clone(),
            provider_error_code: failure.provider_error_code.clone(),
            analysis: analysis.clone(),
        };
        self.history
            .record(failure.payment_id, &entry, self.config.history_ttl_secs)
            .await
    }

    async fn mark_permanent_failure(
        &self,
        payment: &PaymentRecord,
        customer_message: &str,
        max_retries_reached: bool,
    ) -> Result<()> {
        let event = RetryEvent::PermanentlyFailed {
            reason: customer_message.to_string(),
            max_retries_reached,
            at: Utc::now(),
        };
        self.payments
            .mark_permanently_failed(payment.payment_id, payment.booking_id, event)
            .await?;

        if let Err(e) = self.history.clear(payment.payment_id).await {
            tracing::warn!(payment_id = %payment.payment_id, "retry history cleanup failed: {:#}", e);
        }

        self.notify(Job::PaymentPermanentFailure {
            payment_id: payment.payment_id,
            booking_id: payment.booking_id,
            customer_message: customer_message.to_string(),
            priority: Priority::High,
        })
        .await;

        tracing::warn!(
            payment_id = %payment.payment_id,
            booking_id = %payment.booking_id,
            max_retries_reached,
            "payment permanently failed"
        );
        Ok(())
    }

    async fn request_customer_action(
        &self,
        payment: &PaymentRecord,
        analysis: &FailureAnalysis,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let event = RetryEvent::CustomerActionRequested {
            actions: analysis.alternative_actions.clone(),
            customer_message: analysis.customer_message.clone(),
            at: now,
        };
        self.payments.request_customer_action(payment.payment_id, event).await?;

        self.notify(Job::PaymentActionRequired {
            payment_id: payment.payment_id,
            booking_id: payment.booking_id,
            message: analysis.customer_message.clone(),
            alternative_actions: analysis.alternative_actions.clone(),
            priority: Priority::High,
        })
        .await;

        self.queue
            .add_job(
                Job::FollowUpCustomerAction {
                    payment_id: payment.payment_id,
                    booking_id: payment.booking_id,
                },
                JobOptions::delayed(self.config.customer_follow_up_delay_ms),
            )
            .await?;

        tracing::info!(payment_id = %payment.payment_id, "customer action requested");
        Ok(())
    }

    pub async fn execute_payment_retry(&self, request: RetryRequest) -> RetryExecution {
        let token = match self.locks.try_acquire(request.payment_id, self.config.lock_ttl_ms).await {
            Ok(Some(token)) => token,
            Ok(None) => return RetryExecution::skipped("payment is locked by another operation"),
            Err(e) => {
                tracing::error!(payment_id = %request.payment_id, "payment lock unavailable: {:#}", e);
                return self.defer(&request, e).await;
            }
        };

        let result = self.execute_locked(&request).await;
        self.release(request.payment_id, &token).await;
        result
    }

    async fn execute_locked(&self, request: &RetryRequest) -> RetryExecution {
        let payment = match self.payments.find(request.payment_id).await {
            Ok(Some(p)) if p.booking_id == request.booking_id => p,
            Ok(Some(p)) => {
                tracing::error!(
                    payment_id = %request.payment_id,
                    booking_id = %request.booking_id,
                    owner = %p.booking_id,
                    "retry requested for payment of another booking"
                );
                return RetryExecution::failed(format!(
                    "payment {} does not belong to booking {}",
                    request.payment_id, request.booking_id
                ));
            }
            Ok(None) => {
                tracing::error!(payment_id = %request.payment_id, "retry requested for unknown payment");
                return RetryExecution::failed(format!("payment {} not found", request.payment_id));
            }
            Err(e) => return self.defer(request, e).await,
        };

        if payment.status != PaymentStatus::RetryScheduled || payment.next_retry_attempt != Some(request.attempt) {
            tracing::info!(
                payment_id = %payment.payment_id,
                attempt = request.attempt,
                status = payment.status.as_str(),
                scheduled_attempt = ?payment.next_retry_attempt,
                "skipping stale retry"
            );
            return RetryExecution::skipped("retry is no longer scheduled");
        }

        let intent_request = IntentRequest {
            amount_minor: payment.amount_minor,
            currency: payment.currency.clone(),
            customer_id: payment.provider_customer_id.clone(),
            booking_id: payment.booking_id,
            payment_id: payment.payment_id,
            retry_attempt: request.attempt,
            original_intent_id: payment.provider_intent_id.clone(),
            description: format!("Retry attempt {} for booking {}", request.attempt, payment.booking_id),
            idempotency_key: retry_idempotency_key(payment.payment_id, request.attempt),
        };

        let intent = match self.provider.create_intent(intent_request).await {
            Ok(intent) => intent,
            Err(e) => return self.retry_failed(&payment, request.attempt, e).await,
        };

        let event = RetryEvent::RetryExecuted {
            attempt: request.attempt,
            intent_id: intent.intent_id.clone(),
            previous_intent_id: payment.provider_intent_id.clone(),
            at: Utc::now(),
        };
        match self
            .payments
            .attach_retry_intent(payment.payment_id, request.attempt, &intent.intent_id, event)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    payment_id = %payment.payment_id,
                    booking_id = %payment.booking_id,
                    attempt = request.attempt,
                    intent_id = %intent.intent_id,
                    provider = self.provider.name(),
                    "payment retry executed"
                );
                RetryExecution {
                    success: true,
                    new_intent_id: Some(intent.intent_id),
                    requires_action: intent.status == IntentStatus::RequiresAction,
                    ..Default::default()
                }
            }
            Ok(false) => {
                tracing::warn!(
                    payment_id = %payment.payment_id,
                    intent_id = %intent.intent_id,
                    "retry intent created but payment was no longer scheduled"
                );
                RetryExecution::skipped("retry is no longer scheduled")
            }
            Err(e) => {
                // the provider accepted the intent; running the same attempt
                // again reuses it through the idempotency key
                tracing::error!(
                    payment_id = %payment.payment_id,
                    attempt = request.attempt,
                    intent_id = %intent.intent_id,
                    "retry intent not recorded: {:#}",
                    e
                );
                self.defer(request, e).await
            }
        }
    }

    /// Re-enqueues a claimed retry that could not run for reasons unrelated
    /// to the payment. The attempt number is unchanged.
    async fn defer(&self, request: &RetryRequest, err: anyhow::Error) -> RetryExecution {
        let job = Job::RetryDelayed {
            payment_id: request.payment_id,
            booking_id: request.booking_id,
            attempt: request.attempt,
            reason: request.original_reason.clone().unwrap_or_default(),
            provider_error_code: None,
        };
        let delay_ms = self.config.deferred_retry_delay_ms;
        match self.queue.add_job(job, JobOptions::delayed(delay_ms)).await {
            Ok(_) => {
                tracing::warn!(
                    payment_id = %request.payment_id,
                    attempt = request.attempt,
                    delay_ms,
                    "payment retry deferred: {:#}",
                    err
                );
                RetryExecution {
                    deferred: true,
                    error: Some(err.to_string()),
                    ..Default::default()
                }
            }
            Err(qe) => {
                tracing::error!(
                    payment_id = %request.payment_id,
                    attempt = request.attempt,
                    "payment retry could not be deferred: {:#} (after: {:#})",
                    qe,
                    err
                );
                RetryExecution::failed(err.to_string())
            }
        }
    }

    async fn retry_failed(&self, payment: &PaymentRecord, attempt: u32, err: anyhow::Error) -> RetryExecution {
        let message = err.to_string();
        let provider_error_code = err.downcast_ref::<ProviderError>().map(|p| p.code.clone());
        tracing::error!(
            payment_id = %payment.payment_id,
            booking_id = %payment.booking_id,
            attempt,
            "payment retry execution failed: {}",
            message
        );

        if attempt < self.config.max_retries {
            let failure = PaymentFailure {
                payment_id: payment.payment_id,
                booking_id: payment.booking_id,
                failure_reason: message.clone(),
                provider_error_code,
                attempt_number: Some(attempt + 1),
            };
            match self.handle_failure_locked(&failure, attempt + 1).await {
                Ok(outcome) => {
                    tracing::debug!(payment_id = %payment.payment_id, action = ?outcome.action, "retry failure handled")
                }
                Err(e) => {
                    tracing::error!(payment_id = %payment.payment_id, "retry failure handling failed: {:#}", e)
                }
            }
        } else if let Err(e) = self.mark_permanent_failure(payment, MSG_EXHAUSTED, true).await {
            tracing::error!(payment_id = %payment.payment_id, "could not mark payment permanently failed: {:#}", e);
        }

        RetryExecution::failed(message)
    }

    pub async fn get_payment_retry_status(&self, payment_id: Uuid) -> Result<RetryStatus, RetryError> {
        let payment = self
            .payments
            .find(payment_id)
            .await?
            .ok_or(RetryError::PaymentNotFound(payment_id))?;
        let retry_history = self.history.list(payment_id).await?;
        let retry_count = u32::try_from(retry_history.len()).unwrap_or(u32::MAX);

        Ok(RetryStatus {
            current_status: payment.status,
            retry_count,
            next_retry_at: payment.next_retry_at,
            can_retry: retry_count < self.config.max_retries && !payment.status.is_terminal(),
            retry_history,
        })
    }

    /// Reminds the customer when a requested action is still outstanding.
    /// Returns whether a reminder was sent.
    pub async fn follow_up_customer_action(&self, payment_id: Uuid, booking_id: Uuid) -> Result<bool> {
        let Some(payment) = self.payments.find(payment_id).await? else {
            tracing::warn!(%payment_id, "follow-up for unknown payment");
            return Ok(false);
        };
        if payment.status != PaymentStatus::RequiresCustomerAction {
            return Ok(false);
        }

        self.queue
            .add_job(Job::PaymentActionReminder { payment_id, booking_id }, JobOptions::default())
            .await?;
        tracing::info!(%payment_id, %booking_id, "customer action reminder sent");
        Ok(true)
    }

    pub async fn list_payment_failures(&self, limit: i64) -> Result<Vec<PaymentRecord>, RetryError> {
        if !(1..=500).contains(&limit) {
            return Err(RetryError::InvalidRequest("limit must be between 1 and 500".to_string()));
        }
        Ok(self.payments.list_failures(limit).await?)
    }

    async fn notify(&self, job: Job) {
        let job_type = job.job_type();
        if let Err(e) = self.queue.add_job(job, JobOptions::default()).await {
            tracing::warn!("notification {} not enqueued: {:#}", job_type, e);
        }
    }

    async fn release(&self, payment_id: Uuid, token: &LockToken) {
        if let Err(e) = self.locks.release(payment_id, token).await {
            tracing::warn!(%payment_id, "payment lock release failed: {:#}", e);
        }
    }
}
