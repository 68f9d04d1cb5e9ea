use crate::retry::classifier::FailureAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processing,
    Failed,
    RetryScheduled,
    RequiresCustomerAction,
    PermanentlyFailed,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::RetryScheduled => "RETRY_SCHEDULED",
            PaymentStatus::RequiresCustomerAction => "REQUIRES_CUSTOMER_ACTION",
            PaymentStatus::PermanentlyFailed => "PERMANENTLY_FAILED",
            PaymentStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(PaymentStatus::Processing),
            "FAILED" => Some(PaymentStatus::Failed),
            "RETRY_SCHEDULED" => Some(PaymentStatus::RetryScheduled),
            "REQUIRES_CUSTOMER_ACTION" => Some(PaymentStatus::RequiresCustomerAction),
            "PERMANENTLY_FAILED" => Some(PaymentStatus::PermanentlyFailed),
            "PAID" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    /// No further retry or failure handling applies once a payment is here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PermanentlyFailed)
    }
}

/// One entry of a payment's failure history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryEvent {
    FailureRecorded {
        attempt: u32,
        reason: String,
        provider_error_code: Option<String>,
        analysis: FailureAnalysis,
        at: DateTime<Utc>,
    },
    RetryScheduled {
        attempt: u32,
        scheduled_at: DateTime<Utc>,
        reason: String,
        provider_error_code: Option<String>,
    },
    CustomerActionRequested {
        actions: Vec<crate::retry::classifier::AlternativeAction>,
        customer_message: String,
        at: DateTime<Utc>,
    },
    RetryExecuted {
        attempt: u32,
        intent_id: String,
        previous_intent_id: Option<String>,
        at: DateTime<Utc>,
    },
    PermanentlyFailed {
        reason: String,
        max_retries_reached: bool,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_intent_id: Option<String>,
    pub provider_customer_id: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub next_retry_attempt: Option<u32>,
    pub history: Vec<RetryEvent>,
    pub updated_at: DateTime<Utc>,
}

/// Entry kept in the short-lived retry history for a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub recorded_at: DateTime<Utc>,
    pub reason: String,
    pub provider_error_code: Option<String>,
    pub analysis: FailureAnalysis,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}
