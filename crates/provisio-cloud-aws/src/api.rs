//! Client capability consumed by the AWS backend
//!
//! The backend never builds HTTP requests itself. It talks to S3,
//! ElastiCache and RDS through this trait, so the transport (an SDK client,
//! a proxy, or the in-memory simulator used in tests) is chosen by whoever
//! constructs the provider.

use crate::error::ApiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait AwsApi: Send + Sync {
    /// Identity behind the configured credentials (STS GetCallerIdentity)
    async fn caller_identity(&self) -> ApiResult<CallerIdentity>;

    /// S3 CreateBucket. Existing buckets fail with `BucketAlreadyOwnedByYou`
    /// or `BucketAlreadyExists` depending on the owner.
    async fn create_bucket(&self, name: &str, region: &str) -> ApiResult<()>;

    /// S3 HeadBucket; `NotFound` until the bucket is visible
    async fn head_bucket(&self, name: &str) -> ApiResult<()>;

    async fn list_buckets(&self) -> ApiResult<Vec<BucketInfo>>;

    async fn delete_bucket(&self, name: &str) -> ApiResult<()>;

    async fn create_replication_group(
        &self,
        request: &CreateReplicationGroupRequest,
    ) -> ApiResult<ReplicationGroup>;

    async fn describe_replication_group(&self, id: &str) -> ApiResult<ReplicationGroup>;

    async fn delete_replication_group(&self, id: &str) -> ApiResult<()>;

    async fn create_db_instance(&self, request: &CreateDbInstanceRequest)
    -> ApiResult<DbInstance>;

    async fn describe_db_instance(&self, id: &str) -> ApiResult<DbInstance>;

    /// RDS DeleteDBInstance; a `None` snapshot identifier skips the final
    /// snapshot
    async fn delete_db_instance(&self, id: &str, final_snapshot_id: Option<&str>)
    -> ApiResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReplicationGroupRequest {
    pub replication_group_id: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    pub cache_node_type: String,
    pub num_cache_clusters: u32,
    pub automatic_failover: bool,
    pub tags: Vec<Tag>,
}

/// ElastiCache replication group as reported by DescribeReplicationGroups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationGroup {
    pub id: String,
    /// Raw vendor status (`creating`, `available`, `create-failed`, ...)
    pub status: String,
    pub engine: String,
    pub engine_version: String,
    pub cache_node_type: String,
    pub num_cache_clusters: u32,
    pub automatic_failover: bool,
    pub primary_endpoint: Option<Endpoint>,
    /// Vendor explanation for failure states, when one is given
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDbInstanceRequest {
    pub db_instance_identifier: String,
    pub db_name: String,
    pub engine: String,
    pub engine_version: String,
    pub db_instance_class: String,
    pub allocated_storage_gb: u32,
    pub backup_retention_days: u32,
    pub multi_az: bool,
    pub master_username: String,
    /// Let RDS generate the master password and keep it in Secrets Manager
    pub manage_master_user_password: bool,
    pub tags: Vec<Tag>,
}

/// RDS instance as reported by DescribeDBInstances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInstance {
    pub id: String,
    /// Raw vendor status (`creating`, `available`, `failed`, ...)
    pub status: String,
    pub engine: String,
    pub engine_version: String,
    pub db_instance_class: String,
    pub db_name: Option<String>,
    pub allocated_storage_gb: u32,
    pub backup_retention_days: u32,
    pub multi_az: bool,
    pub endpoint: Option<Endpoint>,
    /// ARN of the Secrets Manager secret holding the master credentials
    pub master_user_secret_arn: Option<String>,
    pub status_reason: Option<String>,
}
