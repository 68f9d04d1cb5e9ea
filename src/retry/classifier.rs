use crate::retry::policy::{exponential_backoff, RetryConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeAction {
    UpdatePaymentMethod,
    ContactBank,
    AddFunds,
    DifferentCard,
    #[serde(rename = "3ds_authentication")]
    ThreeDsAuthentication,
    RetryLater,
    DifferentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub is_retryable: bool,
    pub retry_delay_ms: u64,
    pub alternative_actions: Vec<AlternativeAction>,
    pub customer_message: String,
    pub requires_customer_action: bool,
}

const MSG_CHECK_DETAILS: &str =
    "Your payment could not be processed. Please check your payment details or try a different payment method.";
const MSG_TEMPORARY: &str = "We experienced a temporary issue processing your payment. We'll retry shortly.";
const MSG_INSUFFICIENT_FUNDS: &str = "Your card was declined due to insufficient funds. Please check your account balance or use a different payment method.";
const MSG_DECLINED: &str = "Your card was declined. Please contact your bank or try a different payment method.";
const MSG_AUTHENTICATION: &str =
    "Your payment requires additional authentication. Please complete the verification process.";
const MSG_HIGH_VOLUME: &str = "We're experiencing high payment volume. We'll retry your payment shortly.";
const MSG_AUTO_RETRY: &str = "We encountered an issue processing your payment. We'll retry automatically.";

/// Decides whether a failed payment is retried, when, and what the customer
/// is told. Rules are checked in order and the first match wins.
pub fn analyze_payment_failure(
    config: &RetryConfig,
    failure_reason: &str,
    provider_error_code: Option<&str>,
    attempt: u32,
) -> FailureAnalysis {
    let reason = failure_reason.to_lowercase();
    let error_code = provider_error_code.map(str::to_lowercase);

    if matches_any(&reason, &config.permanent_failure_reasons) {
        return FailureAnalysis {
            is_retryable: false,
            retry_delay_ms: 0,
            alternative_actions: vec![AlternativeAction::UpdatePaymentMethod, AlternativeAction::ContactBank],
            customer_message: MSG_CHECK_DETAILS.to_string(),
            requires_customer_action: true,
        };
    }

    if matches_any(&reason, &config.immediate_retry_reasons) {
        return FailureAnalysis {
            is_retryable: true,
            retry_delay_ms: 0,
            alternative_actions: Vec::new(),
            customer_message: MSG_TEMPORARY.to_string(),
            requires_customer_action: false,
        };
    }

    match error_code.as_deref() {
        Some("card_declined") if reason.contains("insufficient_funds") => FailureAnalysis {
            is_retryable: false,
            retry_delay_ms: 0,
            alternative_actions: vec![AlternativeAction::AddFunds, AlternativeAction::DifferentCard],
            customer_message: MSG_INSUFFICIENT_FUNDS.to_string(),
            requires_customer_action: true,
        },
        Some("card_declined") => FailureAnalysis {
            is_retryable: false,
            retry_delay_ms: 0,
            alternative_actions: vec![AlternativeAction::ContactBank, AlternativeAction::DifferentCard],
            customer_message: MSG_DECLINED.to_string(),
            requires_customer_action: true,
        },
        Some("authentication_required") => FailureAnalysis {
            is_retryable: true,
            retry_delay_ms: config.authentication_retry_delay_ms,
            alternative_actions: vec![AlternativeAction::ThreeDsAuthentication],
            customer_message: MSG_AUTHENTICATION.to_string(),
            requires_customer_action: true,
        },
        Some("rate_limit_error") => FailureAnalysis {
            is_retryable: true,
            retry_delay_ms: exponential_backoff(config, attempt),
            alternative_actions: Vec::new(),
            customer_message: MSG_HIGH_VOLUME.to_string(),
            requires_customer_action: false,
        },
        _ => FailureAnalysis {
            is_retryable: attempt < config.max_retries,
            retry_delay_ms: exponential_backoff(config, attempt),
            alternative_actions: vec![AlternativeAction::RetryLater, AlternativeAction::DifferentMethod],
            customer_message: MSG_AUTO_RETRY.to_string(),
            requires_customer_action: false,
        },
    }
}

fn matches_any(reason: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| reason.contains(k.to_lowercase().as_str()))
}
