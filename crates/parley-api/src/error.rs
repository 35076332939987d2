use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parley_types::flow::FlowError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a handler can fail with. The body is always `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A setting the operation depends on is absent.
    #[error("{0} is not configured")]
    Configuration(&'static str),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    /// A database call failed; the cause is logged, never shown to clients.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidCredentials | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        Self::BadRequest(format!("invalid flow: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Upstream(e) => {
                error!("Upstream failure: {:#}", e);
                "internal error".to_string()
            }
            Self::Configuration(_) => {
                error!("{}", self);
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Reject blank required fields.
pub fn require_text(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}
