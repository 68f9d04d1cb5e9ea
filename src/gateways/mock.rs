use crate::gateways::{IntentRequest, IntentResult, IntentStatus, PaymentProvider, ProviderError};
use anyhow::Result;

/// Provider used when no Stripe key is configured.
pub struct MockProvider {
    pub behavior: String,
}

#[async_trait::async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<IntentResult> {
        match self.behavior.as_str() {
            "ALWAYS_FAILURE" => Err(ProviderError {
                code: "network_error".to_string(),
                decline_code: None,
                message: format!("mock failure for payment {}", request.payment_id),
            }
            .into()),
            "REQUIRES_ACTION" => Ok(IntentResult {
                intent_id: format!("pi_mock_{}", uuid::Uuid::new_v4().simple()),
                status: IntentStatus::RequiresAction,
            }),
            _ => Ok(IntentResult {
                intent_id: format!("pi_mock_{}", uuid::Uuid::new_v4().simple()),
                status: IntentStatus::Processing,
            }),
        }
    }
}
