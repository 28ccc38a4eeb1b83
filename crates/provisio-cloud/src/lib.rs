//! Provisio Cloud
//!
//! Vendor-neutral provisioning contract for three classes of managed
//! infrastructure: object storage buckets, in-memory cache clusters and
//! relational databases.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        caller (reconciliation controller)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │ vendor key
//! ┌─────────────────▼───────────────────────────────┐
//! │            provisio::ProviderFactory             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Arc<dyn CloudProvider>
//! ┌─────────────────▼───────────────────────────────┐
//! │               provisio-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌──────────┐ ┌────────────┐   │
//! │  │ Descriptors  │ │  State   │ │ Poll/Retry │   │
//! │  └──────────────┘ └──────────┘ └────────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  aws backend  │──▶ AwsApi (S3 / ElastiCache / RDS)
//! └───────────────┘
//! ```

pub mod context;
pub mod coordinates;
pub mod error;
pub mod poll;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod state;

// Re-exports
pub use context::OperationContext;
pub use coordinates::{Coordinates, CredentialsRef};
pub use error::{CloudError, ErrorKind, Result};
pub use poll::{PollStep, poll_until};
pub use provider::{AuthStatus, CloudProvider};
pub use resource::{
    CacheDescriptor, CacheEngine, DatabaseDescriptor, DatabaseEngine, StorageBucketName, Tier,
};
pub use retry::{PollConfig, RetryConfig, Transience, retry_transient};
pub use state::{ProvisioningState, StateTracker, StateTransition};

pub use tokio_util::sync::CancellationToken;
