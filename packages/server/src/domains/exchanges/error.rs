use std::time::Duration;

use thiserror::Error;

use crate::common::retry::Transient;
use crate::domains::exchanges::models::ExchangeStatus;

/// Errors surfaced by exchange lifecycle operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot request your own skill")]
    SelfRequestForbidden,

    #[error("You already have an open exchange request for this skill")]
    DuplicateRequest,

    #[error("Cannot move exchange from {from} to {to}")]
    InvalidTransition { from: ExchangeStatus, to: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Exchange was modified concurrently, reload and retry")]
    Conflict,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ExchangeError {
    /// Stable machine-readable kind, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::Unauthenticated => "unauthenticated",
            ExchangeError::Unauthorized(_) => "unauthorized",
            ExchangeError::NotFound(_) => "not_found",
            ExchangeError::SelfRequestForbidden => "self_request_forbidden",
            ExchangeError::DuplicateRequest => "duplicate_request",
            ExchangeError::InvalidTransition { .. } => "invalid_transition",
            ExchangeError::InvalidState(_) => "invalid_state",
            ExchangeError::ValidationError(_) => "validation_error",
            ExchangeError::Conflict => "conflict",
            ExchangeError::StoreUnavailable(_) => "store_unavailable",
            ExchangeError::Internal(_) => "internal",
        }
    }

    /// Whether the caller may safely retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Conflict | ExchangeError::StoreUnavailable(_)
        )
    }
}

impl Transient for ExchangeError {
    fn should_retry(&self) -> bool {
        // Conflict is left for the caller to retry with fresh state.
        matches!(self, ExchangeError::StoreUnavailable(_))
    }

    fn timed_out(operation: &'static str, after: Duration) -> Self {
        ExchangeError::StoreUnavailable(format!(
            "{} timed out after {}ms",
            operation,
            after.as_millis()
        ))
    }
}

impl From<sqlx::Error> for ExchangeError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => ExchangeError::NotFound("Record".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ExchangeError::StoreUnavailable(error.to_string())
            }
            other => ExchangeError::Internal(other.into()),
        }
    }
}
