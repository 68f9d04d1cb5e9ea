use crate::gateways::{IntentRequest, IntentResult, IntentStatus, PaymentProvider, ProviderError};
use anyhow::Result;
use serde::Deserialize;

pub struct StripeProvider {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    status: IntentStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

#[async_trait::async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<IntentResult> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let form = intent_form(&request);

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let body: IntentBody = r.json().await?;
                Ok(IntentResult {
                    intent_id: body.id,
                    status: body.status,
                })
            }
            Ok(r) => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                Err(parse_error(status.as_u16(), &text).into())
            }
            Err(e) if e.is_timeout() || e.is_connect() => Err(ProviderError {
                code: "network_error".to_string(),
                decline_code: None,
                message: e.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }
}

fn intent_form(request: &IntentRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount_minor.to_string()),
        ("currency".to_string(), request.currency.to_lowercase()),
        ("description".to_string(), request.description.clone()),
        ("metadata[bookingId]".to_string(), request.booking_id.to_string()),
        ("metadata[paymentId]".to_string(), request.payment_id.to_string()),
        ("metadata[retryAttempt]".to_string(), request.retry_attempt.to_string()),
    ];
    if let Some(customer) = &request.customer_id {
        form.push(("customer".to_string(), customer.clone()));
    }
    if let Some(original) = &request.original_intent_id {
        form.push(("metadata[originalPaymentId]".to_string(), original.clone()));
    }
    form
}

/// Turns a non-2xx Stripe response into a [`ProviderError`]. The decline
/// code, when present, is folded into the message so reasons such as
/// `insufficient_funds` stay visible to classification.
fn parse_error(http_status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let detail = parsed.error;
            let code = detail
                .code
                .or(detail.kind)
                .unwrap_or_else(|| format!("http_{}", http_status));
            let mut message = detail.message.unwrap_or_default();
            if let Some(decline) = &detail.decline_code {
                message = format!("{} ({})", decline, message);
            }
            ProviderError {
                code,
                decline_code: detail.decline_code,
                message,
            }
        }
        Err(_) => ProviderError {
            code: if http_status == 503 {
                "service_unavailable".to_string()
            } else {
                format!("http_{}", http_status)
            },
            decline_code: None,
            message: body.chars().take(200).collect(),
        },
    }
}
