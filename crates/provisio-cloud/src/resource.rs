//! Resource descriptors
//!
//! Immutable values describing the desired state of a managed resource.
//! Descriptors are owned by the caller; providers only read them.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name of an object storage bucket, unique within the vendor account
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageBucketName(String);

impl StorageBucketName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageBucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageBucketName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StorageBucketName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Size tier; determines sizing and high availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Dev,
    Prod,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Dev => "dev",
            Tier::Prod => "prod",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Tier::Dev),
            "prod" | "production" => Ok(Tier::Prod),
            other => Err(CloudError::validation(format!("unknown tier: {other}"))),
        }
    }
}

/// In-memory cache engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEngine {
    Redis,
}

impl CacheEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEngine::Redis => "redis",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            CacheEngine::Redis => 6379,
        }
    }
}

impl std::fmt::Display for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational database engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngine {
    Postgres,
}

impl DatabaseEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgres",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseEngine::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a managed cache cluster
///
/// The cluster name identifies the resource; requesting the same name with
/// a different engine, version or tier is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheDescriptor {
    pub cluster_name: String,
    pub engine: CacheEngine,
    pub engine_version: String,
    pub tier: Tier,
}

impl CacheDescriptor {
    pub fn new(
        cluster_name: impl Into<String>,
        engine: CacheEngine,
        engine_version: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            engine,
            engine_version: engine_version.into(),
            tier,
        }
    }

    /// Resource key used in logs and errors (`cache/<name>`)
    pub fn resource_key(&self) -> String {
        format!("cache/{}", self.cluster_name)
    }

    /// Vendor-independent checks
    pub fn validate(&self) -> Result<()> {
        require_non_empty("cluster_name", &self.cluster_name)?;
        require_non_empty("engine_version", &self.engine_version)?;
        Ok(())
    }
}

/// Desired state of a managed relational database instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub cluster_name: String,
    pub engine: DatabaseEngine,
    pub engine_version: String,
    pub database_name: String,
    pub tier: Tier,
    /// Backup retention in days; zero disables automated backups
    pub retention_period_days: u32,
    pub storage_size_gb: u32,
}

impl DatabaseDescriptor {
    /// Resource key used in logs and errors (`database/<name>`)
    pub fn resource_key(&self) -> String {
        format!("database/{}", self.cluster_name)
    }

    /// Vendor-independent checks
    pub fn validate(&self) -> Result<()> {
        require_non_empty("cluster_name", &self.cluster_name)?;
        require_non_empty("engine_version", &self.engine_version)?;
        require_non_empty("database_name", &self.database_name)?;
        if self.storage_size_gb == 0 {
            return Err(CloudError::validation(
                "storage_size_gb must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CloudError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
