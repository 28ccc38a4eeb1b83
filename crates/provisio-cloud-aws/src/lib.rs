//! Provisio Cloud - AWS
//!
//! AWS backend: S3 buckets for storage, ElastiCache replication groups for
//! caches and RDS instances for databases.
//!
//! The backend talks to AWS through the [`AwsApi`] capability. Enable the
//! `test-utils` feature for [`testing::SimulatedAws`], an in-memory control
//! plane that reproduces the vendor status lifecycle.

pub mod api;
pub mod error;
pub mod provider;
pub mod sizing;
pub mod status;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use api::{AwsApi, CallerIdentity};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use provider::{AwsProvider, AwsSettings};
pub use sizing::{CacheProfile, DatabaseProfile};
