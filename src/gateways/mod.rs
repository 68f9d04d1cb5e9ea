use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod mock;
pub mod stripe;

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub retry_attempt: u32,
    pub original_intent_id: Option<String>,
    pub description: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Processing,
    Succeeded,
    Canceled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent_id: String,
    pub status: IntentStatus,
}

/// A rejected provider call. The message starts with the provider's error
/// code so the failure classifier can match on it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub decline_code: Option<String>,
    pub message: String,
}

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_intent(&self, request: IntentRequest) -> Result<IntentResult>;
}

/// Stable key so a re-delivered retry job cannot create a second intent.
pub fn retry_idempotency_key(payment_id: Uuid, attempt: u32) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(payment_id.as_bytes());
    hasher.update(attempt.to_be_bytes());
    let hash = hasher.finalize();
    let hex: String = hash.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("retry_{}", hex)
}
