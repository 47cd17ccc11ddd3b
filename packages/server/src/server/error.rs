//! HTTP mapping for lifecycle errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domains::exchanges::ExchangeError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

impl ExchangeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExchangeError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ExchangeError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ExchangeError::NotFound(_) => StatusCode::NOT_FOUND,
            ExchangeError::SelfRequestForbidden => StatusCode::BAD_REQUEST,
            ExchangeError::DuplicateRequest
            | ExchangeError::InvalidTransition { .. }
            | ExchangeError::InvalidState(_)
            | ExchangeError::Conflict => StatusCode::CONFLICT,
            ExchangeError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ExchangeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ExchangeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let message = match &self {
            ExchangeError::Internal(e) => {
                error!(error = %e, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
            retryable: self.is_retryable(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}
