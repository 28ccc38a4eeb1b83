//! Cloud provider trait definition

use crate::context::OperationContext;
use crate::coordinates::Coordinates;
use crate::error::Result;
use crate::resource::{CacheDescriptor, DatabaseDescriptor, StorageBucketName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Uniform provisioning contract
///
/// Every vendor backend implements this trait so that a controller can
/// manage storage buckets, cache clusters and databases without knowing
/// which cloud is underneath.
///
/// All create/remove pairs are idempotent: re-invoking an operation after a
/// crash, a timeout or a cancellation re-attaches to whatever the vendor is
/// already doing instead of failing or creating a duplicate. Handles are
/// shared between tasks, so implementations keep no mutable state of their
/// own; the vendor control plane is queried on every call.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the vendor client is configured and can authenticate
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create a bucket. Succeeds without changes if this account already
    /// owns it; fails with a conflict if another account does.
    async fn create_storage(&self, name: &StorageBucketName, ctx: &OperationContext)
    -> Result<()>;

    /// Buckets owned by the account, ordered by name
    async fn list_storage(&self, ctx: &OperationContext) -> Result<Vec<StorageBucketName>>;

    /// Remove a bucket. Removing a bucket that does not exist succeeds.
    async fn remove_storage(&self, name: &StorageBucketName, ctx: &OperationContext)
    -> Result<()>;

    /// Create or adopt a cache cluster and wait until it is available
    async fn create_cache(
        &self,
        cache: &CacheDescriptor,
        ctx: &OperationContext,
    ) -> Result<Coordinates>;

    /// Delete a cache cluster and wait until it is gone
    async fn remove_cache(&self, cache: &CacheDescriptor, ctx: &OperationContext) -> Result<()>;

    /// Create or adopt a database instance and wait until it is available.
    /// Storage size and retention are checked against vendor limits before
    /// any vendor call is made.
    async fn create_database(
        &self,
        database: &DatabaseDescriptor,
        ctx: &OperationContext,
    ) -> Result<Coordinates>;

    /// Delete a database instance and wait until it is gone
    async fn remove_database(
        &self,
        database: &DatabaseDescriptor,
        ctx: &OperationContext,
    ) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
