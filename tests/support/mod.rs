#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use notary_payments::domain::booking::BookingStatus;
use notary_payments::domain::payment::{PaymentRecord, PaymentStatus, RetryAttempt, RetryEvent};
use notary_payments::gateways::{IntentRequest, IntentResult, IntentStatus, PaymentProvider, ProviderError};
use notary_payments::queue::{Job, JobOptions, JobQueue, QueueName, QueuedJob};
use notary_payments::repo::payments_repo::PaymentStore;
use notary_payments::retry::policy::RetryConfig;
use notary_payments::retry::{LockToken, PaymentLocks, RetryHistoryStore};
use notary_payments::service::retry_service::PaymentRetryService;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BookingRow {
    pub status: BookingStatus,
    pub payment_status: Option<PaymentStatus>,
}

/// Decrements `remaining` and reports whether this call should fail.
fn injected(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct MemoryPayments {
    pub payments: Mutex<HashMap<Uuid, PaymentRecord>>,
    pub bookings: Mutex<HashMap<Uuid, BookingRow>>,
    /// Number of upcoming `find` calls that error.
    pub failing_finds: AtomicUsize,
    /// Number of upcoming `attach_retry_intent` calls that error.
    pub failing_attaches: AtomicUsize,
}

impl MemoryPayments {
    pub fn payment(&self, payment_id: Uuid) -> PaymentRecord {
        self.payments.lock().unwrap()[&payment_id].clone()
    }

    pub fn booking(&self, booking_id: Uuid) -> BookingRow {
        self.bookings.lock().unwrap()[&booking_id].clone()
    }

    fn update<F: FnOnce(&mut PaymentRecord)>(&self, payment_id: Uuid, f: F) -> Result<()> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(&payment_id)
            .ok_or_else(|| anyhow!("no payment {}", payment_id))?;
        f(payment);
        payment.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentStore for MemoryPayments {
    async fn find(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        if injected(&self.failing_finds) {
            return Err(anyhow!("connection reset while reading payment"));
        }
        Ok(self.payments.lock().unwrap().get(&payment_id).cloned())
    }

    async fn record_failure(&self, payment_id: Uuid, event: RetryEvent) -> Result<()> {
        self.update(payment_id, |p| {
            p.status = PaymentStatus::Failed;
            p.next_retry_at = None;
            p.next_retry_attempt = None;
            p.history.push(event);
        })
    }

    async fn schedule_retry(
        &self,
        payment_id: Uuid,
        attempt: u32,
        scheduled_at: DateTime<Utc>,
        event: RetryEvent,
    ) -> Result<bool> {
        let mut scheduled = false;
        self.update(payment_id, |p| {
            if p.status == PaymentStatus::Failed {
                p.status = PaymentStatus::RetryScheduled;
                p.next_retry_at = Some(scheduled_at);
                p.next_retry_attempt = Some(attempt);
                p.history.push(event);
                scheduled = true;
            }
        })?;
        Ok(scheduled)
    }

    async fn request_customer_action(&self, payment_id: Uuid, event: RetryEvent) -> Result<()> {
        self.update(payment_id, |p| {
            p.status = PaymentStatus::RequiresCustomerAction;
            p.next_retry_at = None;
            p.next_retry_attempt = None;
            p.history.push(event);
        })
    }

    async fn mark_permanently_failed(&self, payment_id: Uuid, booking_id: Uuid, event: RetryEvent) -> Result<()> {
        self.update(payment_id, |p| {
            p.status = PaymentStatus::PermanentlyFailed;
            p.next_retry_at = None;
            p.next_retry_attempt = None;
            p.history.push(event);
        })?;

        let mut bookings = self.bookings.lock().unwrap();
        if let Some(booking) = bookings.get_mut(&booking_id) {
            if booking.status.mirrors_payment_failure() {
                booking.status = BookingStatus::PaymentFailed;
            }
            booking.payment_status = Some(PaymentStatus::PermanentlyFailed);
        }
        Ok(())
    }

    async fn attach_retry_intent(
        &self,
        payment_id: Uuid,
        attempt: u32,
        intent_id: &str,
        event: RetryEvent,
    ) -> Result<bool> {
        if injected(&self.failing_attaches) {
            return Err(anyhow!("connection reset while updating payment"));
        }
        let mut attached = false;
        self.update(payment_id, |p| {
            if p.status == PaymentStatus::RetryScheduled && p.next_retry_attempt == Some(attempt) {
                p.status = PaymentStatus::Processing;
                p.provider_intent_id = Some(intent_id.to_string());
                p.next_retry_at = None;
                p.next_retry_attempt = None;
                p.history.push(event);
                attached = true;
            }
        })?;
        Ok(attached)
    }

    async fn list_failures(&self, limit: i64) -> Result<Vec<PaymentRecord>> {
        let mut rows: Vec<PaymentRecord> = self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                matches!(
                    p.status,
                    PaymentStatus::Failed
                        | PaymentStatus::RetryScheduled
                        | PaymentStatus::RequiresCustomerAction
                        | PaymentStatus::PermanentlyFailed
                )
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    pub entries: Mutex<HashMap<Uuid, Vec<RetryAttempt>>>,
}

#[async_trait::async_trait]
impl RetryHistoryStore for MemoryHistory {
    async fn record(&self, payment_id: Uuid, attempt: &RetryAttempt, _ttl_secs: i64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let list = entries.entry(payment_id).or_default();
        list.push(attempt.clone());
        list.sort_by_key(|a| a.attempt);
        Ok(())
    }

    async fn list(&self, payment_id: Uuid) -> Result<Vec<RetryAttempt>> {
        Ok(self.entries.lock().unwrap().get(&payment_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, payment_id: Uuid) -> Result<()> {
        self.entries.lock().unwrap().remove(&payment_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLocks {
    pub held: Mutex<HashMap<Uuid, String>>,
    pub failing_acquires: AtomicUsize,
}

#[async_trait::async_trait]
impl PaymentLocks for MemoryLocks {
    async fn try_acquire(&self, payment_id: Uuid, _ttl_ms: u64) -> Result<Option<LockToken>> {
        if injected(&self.failing_acquires) {
            return Err(anyhow!("lock store unreachable"));
        }
        let mut held = self.held.lock().unwrap();
        if held.contains_key(&payment_id) {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        held.insert(payment_id, token.clone());
        Ok(Some(LockToken(token)))
    }

    async fn release(&self, payment_id: Uuid, token: &LockToken) -> Result<()> {
        let mut held = self.held.lock().unwrap();
        if held.get(&payment_id) == Some(&token.0) {
            held.remove(&payment_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    pub jobs: Mutex<Vec<QueuedJob>>,
    /// Queue whose `add_job` calls are rejected.
    pub unavailable: Mutex<Option<QueueName>>,
}

impl MemoryQueue {
    pub fn snapshot(&self) -> Vec<QueuedJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn on(&self, queue: QueueName) -> Vec<QueuedJob> {
        self.snapshot().into_iter().filter(|j| j.queue == queue).collect()
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryQueue {
    async fn add_job(&self, job: Job, options: JobOptions) -> Result<QueuedJob> {
        if *self.unavailable.lock().unwrap() == Some(job.queue()) {
            return Err(anyhow!("queue {} unavailable", job.queue().as_str()));
        }
        let now = Utc::now();
        let queued = QueuedJob {
            id: Uuid::new_v4(),
            queue: job.queue(),
            run_at: now + chrono::Duration::milliseconds(options.delay_ms as i64),
            enqueued_at: now,
            job,
        };
        self.jobs.lock().unwrap().push(queued.clone());
        Ok(queued)
    }

    async fn take_due(&self, queue: QueueName, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueuedJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for job in jobs.drain(..) {
            if job.queue == queue && job.run_at <= now && taken.len() < limit {
                taken.push(job);
            } else {
                kept.push(job);
            }
        }
        *jobs = kept;
        Ok(taken)
    }
}

/// Replays queued results, then succeeds.
#[derive(Default)]
pub struct ScriptedProvider {
    pub results: Mutex<VecDeque<std::result::Result<IntentStatus, ProviderError>>>,
    pub requests: Mutex<Vec<IntentRequest>>,
}

impl ScriptedProvider {
    pub fn push_failure(&self, code: &str, message: &str) {
        self.results.lock().unwrap().push_back(Err(ProviderError {
            code: code.to_string(),
            decline_code: None,
            message: message.to_string(),
        }));
    }

    pub fn push_status(&self, status: IntentStatus) {
        self.results.lock().unwrap().push_back(Ok(status));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<IntentResult> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Err(e)) => Err(e.into()),
            Some(Ok(status)) => Ok(IntentResult {
                intent_id: format!("pi_test_{}", n),
                status,
            }),
            None => Ok(IntentResult {
                intent_id: format!("pi_test_{}", n),
                status: IntentStatus::Processing,
            }),
        }
    }
}

pub struct Harness {
    pub service: PaymentRetryService,
    pub payments: Arc<MemoryPayments>,
    pub history: Arc<MemoryHistory>,
    pub locks: Arc<MemoryLocks>,
    pub queue: Arc<MemoryQueue>,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new() -> Self {
        let payments = Arc::new(MemoryPayments::default());
        let history = Arc::new(MemoryHistory::default());
        let locks = Arc::new(MemoryLocks::default());
        let queue = Arc::new(MemoryQueue::default());
        let provider = Arc::new(ScriptedProvider::default());

        let service = PaymentRetryService {
            config: RetryConfig::default(),
            payments: payments.clone(),
            history: history.clone(),
            locks: locks.clone(),
            queue: queue.clone(),
            provider: provider.clone(),
        };

        Self {
            service,
            payments,
            history,
            locks,
            queue,
            provider,
        }
    }

    /// Inserts a booking awaiting payment and its payment in `status`.
    pub fn seed(&self, status: PaymentStatus) -> (Uuid, Uuid) {
        let payment_id = Uuid::new_v4();
        let booking_id = Uuid::new_v4();

        self.payments.bookings.lock().unwrap().insert(
            booking_id,
            BookingRow {
                status: BookingStatus::PaymentPending,
                payment_status: None,
            },
        );
        self.payments.payments.lock().unwrap().insert(
            payment_id,
            PaymentRecord {
                payment_id,
                booking_id,
                amount_minor: 12_500,
                currency: "USD".to_string(),
                status,
                provider_intent_id: Some("pi_original".to_string()),
                provider_customer_id: Some("cus_test".to_string()),
                next_retry_at: None,
                next_retry_attempt: None,
                history: Vec::new(),
                updated_at: Utc::now(),
            },
        );

        (payment_id, booking_id)
    }

    /// Seeds a payment that already has `attempt` scheduled.
    pub fn seed_scheduled(&self, attempt: u32) -> (Uuid, Uuid) {
        let (payment_id, booking_id) = self.seed(PaymentStatus::RetryScheduled);
        self.payments
            .update(payment_id, |p| {
                p.next_retry_attempt = Some(attempt);
                p.next_retry_at = Some(Utc::now());
            })
            .unwrap();
        (payment_id, booking_id)
    }
}
