use crate::error::RetryError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FailureListQuery {
    pub limit: Option<i64>,
}

pub async fn list_payment_failures(
    State(state): State<AppState>,
    Query(query): Query<FailureListQuery>,
) -> Result<impl IntoResponse, RetryError> {
    let payments = state
        .retry_service
        .list_payment_failures(query.limit.unwrap_or(50))
        .await?;

    Ok(Json(serde_json::json!({
        "total": payments.len(),
        "payments": payments,
    })))
}
