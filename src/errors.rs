use crate::rate_limit::Quota;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{}", .quota.message())]
    RateLimitExceeded {
        quota: Quota,
        limit: usize,
        retry_after_secs: u64,
    },
    #[error("Not authorized, no valid token")]
    Unauthorized,
    #[error("Not authorized to perform this action")]
    Forbidden,
    #[error("Reset is not allowed in production")]
    ResetForbidden,
    #[error("Invalid cache key input: {0}")]
    InvalidCacheKey(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::ResetForbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidCacheKey(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for GatewayError {}
