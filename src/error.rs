use axum::http::StatusCode;

use crate::retry::RetryError;

/// Why a listing could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An enumerated key lacks the configured prefix. Either the prefix is
    /// misconfigured or something else writes into the keyspace.
    #[error("key {key:?} does not start with {prefix:?}")]
    InvalidKey { key: String, prefix: String },
    #[error(transparent)]
    Store(#[from] RetryError),
    #[error("encoding response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The presented `access_token` does not match the configured one.
#[derive(Debug, thiserror::Error)]
#[error("Not authorized")]
pub struct AuthError;

impl From<AuthError> for (StatusCode, String) {
    fn from(e: AuthError) -> Self {
        (StatusCode::UNAUTHORIZED, e.to_string())
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Store(RetryError::Exhausted { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Store(RetryError::DeadlineExceeded { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            PipelineError::InvalidKey { .. } | PipelineError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
