use crate::domain::payment::{ErrorEnvelope, ErrorPayload};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RetryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RetryError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            RetryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RetryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RetryError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            RetryError::InvalidRequest(_) => "INVALID_REQUEST",
            RetryError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for RetryError {
    fn into_response(self) -> Response {
        if let RetryError::Internal(e) = &self {
            tracing::error!("request failed: {:#}", e);
        }
        let body = ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}
