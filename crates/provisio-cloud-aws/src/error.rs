//! AWS client error types

use provisio_cloud::{CloudError, Transience};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes the backend distinguishes. Anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Throttling,
    Network,
    ExpiredToken,
    ServiceUnavailable,
    NotFound,
    AlreadyExists,
    BucketAlreadyOwnedByYou,
    BucketAlreadyExists,
    BucketNotEmpty,
    InvalidState,
    InvalidParameter,
    QuotaExceeded,
    AccessDenied,
    Unknown,
}

impl ErrorCode {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::Throttling
                | ErrorCode::Network
                | ErrorCode::ExpiredToken
                | ErrorCode::ServiceUnavailable
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Throttling => "Throttling",
            ErrorCode::Network => "NetworkFailure",
            ErrorCode::ExpiredToken => "ExpiredToken",
            ErrorCode::ServiceUnavailable => "ServiceUnavailable",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::AlreadyExists => "AlreadyExists",
            ErrorCode::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            ErrorCode::BucketAlreadyExists => "BucketAlreadyExists",
            ErrorCode::BucketNotEmpty => "BucketNotEmpty",
            ErrorCode::InvalidState => "InvalidState",
            ErrorCode::InvalidParameter => "InvalidParameterValue",
            ErrorCode::QuotaExceeded => "QuotaExceeded",
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Error returned by an [`AwsApi`](crate::api::AwsApi) call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl Transience for ApiError {
    fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

/// Fallback conversion for codes the caller did not handle itself
impl From<ApiError> for CloudError {
    fn from(err: ApiError) -> Self {
        if err.code.is_transient() {
            CloudError::Transient {
                attempts: 1,
                message: err.to_string(),
            }
        } else {
            CloudError::Fatal(err.to_string())
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
