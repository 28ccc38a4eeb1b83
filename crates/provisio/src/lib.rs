//! Provisio
//!
//! Vendor-neutral provisioning of object storage buckets, in-memory cache
//! clusters and relational databases.
//!
//! ```ignore
//! use provisio::{OperationContext, ProviderFactory, StorageBucketName};
//!
//! let config = provisio::config::load_or_default()?;
//! let factory = ProviderFactory::new(config).with_aws_api(client);
//! let provider = factory.get("aws")?;
//!
//! let ctx = OperationContext::new();
//! provider.create_storage(&StorageBucketName::new("assets"), &ctx).await?;
//! ```

pub mod factory;

pub use factory::{ProviderFactory, Vendor, poll_config, retry_config};

pub use provisio_cloud::{
    AuthStatus, CacheDescriptor, CacheEngine, CancellationToken, CloudError, CloudProvider,
    Coordinates, CredentialsRef, DatabaseDescriptor, DatabaseEngine, ErrorKind,
    OperationContext, ProvisioningState, Result, StorageBucketName, Tier,
};

pub use provisio_cloud_aws as aws;
pub use provisio_config as config;
