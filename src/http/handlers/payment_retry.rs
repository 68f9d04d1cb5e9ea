use crate::error::RetryError;
use crate::service::retry_service::{PaymentFailure, RetryRequest};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ReportFailureBody {
    pub booking_id: Uuid,
    pub failure_reason: String,
    pub provider_error_code: Option<String>,
    pub attempt_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRetryBody {
    pub booking_id: Uuid,
    pub attempt: u32,
    pub original_reason: Option<String>,
}

pub async fn report_failure(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<ReportFailureBody>,
) -> impl IntoResponse {
    if body.failure_reason.trim().is_empty() {
        return RetryError::InvalidRequest("failure_reason is required".to_string()).into_response();
    }

    let outcome = state
        .retry_service
        .handle_payment_failure(PaymentFailure {
            payment_id,
            booking_id: body.booking_id,
            failure_reason: body.failure_reason,
            provider_error_code: body.provider_error_code,
            attempt_number: body.attempt_number,
        })
        .await;

    (axum::http::StatusCode::OK, Json(outcome)).into_response()
}

pub async fn execute_retry(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<ExecuteRetryBody>,
) -> impl IntoResponse {
    let result = state
        .retry_service
        .execute_payment_retry(RetryRequest {
            payment_id,
            booking_id: body.booking_id,
            attempt: body.attempt,
            original_reason: body.original_reason,
        })
        .await;

    let status = if result.skipped {
        axum::http::StatusCode::CONFLICT
    } else if result.deferred {
        axum::http::StatusCode::ACCEPTED
    } else {
        axum::http::StatusCode::OK
    };
    (status, Json(result)).into_response()
}

pub async fn get_retry_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, RetryError> {
    let status = state.retry_service.get_payment_retry_status(payment_id).await?;
    Ok(Json(status))
}
