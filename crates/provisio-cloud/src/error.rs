//! Provisioning error types
//!
//! Every operation of the provider contract fails with exactly one of these
//! kinds. Callers decide between retry and abort from [`CloudError::kind`]
//! or the `is_*` helpers rather than by matching message text.

use std::time::Duration;
use thiserror::Error;

/// Provisioning errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("Vendor rejected request: {0}")]
    Fatal(String),

    #[error("Provisioning of {resource} failed: {reason}")]
    Provisioning { resource: String, reason: String },

    #[error("Deletion of {resource} failed: {reason}")]
    DeleteFailed { resource: String, reason: String },

    #[error("Timed out after {after:?} waiting for {resource}")]
    Timeout { resource: String, after: Duration },

    #[error("Operation on {resource} was cancelled")]
    Cancelled { resource: String },
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Discriminant of [`CloudError`] without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedVendor,
    InvalidConfig,
    Validation,
    Conflict,
    Transient,
    Fatal,
    Provisioning,
    DeleteFailed,
    Timeout,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnsupportedVendor => "unsupported-vendor",
            ErrorKind::InvalidConfig => "invalid-config",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Provisioning => "provisioning",
            ErrorKind::DeleteFailed => "delete-failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl CloudError {
    pub fn validation(message: impl Into<String>) -> Self {
        CloudError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CloudError::Conflict(message.into())
    }

    pub fn provisioning(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::Provisioning {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn delete_failed(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::DeleteFailed {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(resource: impl Into<String>) -> Self {
        CloudError::Cancelled {
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::UnsupportedVendor(_) => ErrorKind::UnsupportedVendor,
            CloudError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CloudError::Validation(_) => ErrorKind::Validation,
            CloudError::Conflict(_) => ErrorKind::Conflict,
            CloudError::Transient { .. } => ErrorKind::Transient,
            CloudError::Fatal(_) => ErrorKind::Fatal,
            CloudError::Provisioning { .. } => ErrorKind::Provisioning,
            CloudError::DeleteFailed { .. } => ErrorKind::DeleteFailed,
            CloudError::Timeout { .. } => ErrorKind::Timeout,
            CloudError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns true if re-invoking the same idempotent call may succeed
    /// without any change to input or configuration
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::Transient { .. } | CloudError::Timeout { .. } | CloudError::Cancelled { .. }
        )
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudError::Conflict(_))
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, CloudError::Validation(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudError::Timeout { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CloudError::Cancelled { .. })
    }

    /// Raw reason reported by the vendor for a terminal failure state
    pub fn vendor_reason(&self) -> Option<&str> {
        match self {
            CloudError::Provisioning { reason, .. } | CloudError::DeleteFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}
