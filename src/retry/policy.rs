use serde::{Deserialize, Serialize};

pub const MINUTE_MS: u64 = 60 * 1000;
pub const HOUR_MS: u64 = 60 * MINUTE_MS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
    pub immediate_retry_reasons: Vec<String>,
    pub permanent_failure_reasons: Vec<String>,
    pub authentication_retry_delay_ms: u64,
    pub customer_follow_up_delay_ms: u64,
    pub history_ttl_secs: i64,
    pub lock_ttl_ms: u64,
    /// Delay before a claimed retry that could not run is picked up again.
    pub deferred_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 5 * MINUTE_MS,
            max_delay_ms: 24 * HOUR_MS,
            backoff_multiplier: 2,
            immediate_retry_reasons: to_owned(&[
                "network_error",
                "temporary_decline",
                "rate_limited",
                "service_unavailable",
            ]),
            permanent_failure_reasons: to_owned(&[
                "card_declined",
                "insufficient_funds",
                "expired_card",
                "invalid_card_number",
                "invalid_expiry_date",
                "invalid_cvc",
                "processing_error",
                "card_not_supported",
                "currency_not_supported",
            ]),
            authentication_retry_delay_ms: 10 * MINUTE_MS,
            customer_follow_up_delay_ms: 24 * HOUR_MS,
            history_ttl_secs: 7 * 24 * 60 * 60,
            lock_ttl_ms: 30_000,
            deferred_retry_delay_ms: 30_000,
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `min(base * multiplier^(attempt-1), max)`; attempt 0 counts as the first.
pub fn exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let exponent = attempt.max(1) - 1;
    let factor = config.backoff_multiplier.saturating_pow(exponent);
    config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms)
}
