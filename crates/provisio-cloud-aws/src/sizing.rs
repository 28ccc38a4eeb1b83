//! Tier sizing and AWS input limits

use provisio_cloud::{CloudError, DatabaseDescriptor, Result, StorageBucketName, Tier};

pub const MIN_DB_STORAGE_GB: u32 = 20;
pub const MAX_DB_STORAGE_GB: u32 = 65_536;
pub const MAX_BACKUP_RETENTION_DAYS: u32 = 35;

const MAX_REPLICATION_GROUP_ID_LEN: usize = 40;
const MAX_DB_INSTANCE_ID_LEN: usize = 63;
const MAX_DB_NAME_LEN: usize = 63;

/// ElastiCache sizing for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheProfile {
    pub node_type: &'static str,
    pub num_cache_clusters: u32,
    pub automatic_failover: bool,
}

impl CacheProfile {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Dev => Self {
                node_type: "cache.t3.micro",
                num_cache_clusters: 1,
                automatic_failover: false,
            },
            Tier::Prod => Self {
                node_type: "cache.m5.large",
                num_cache_clusters: 2,
                automatic_failover: true,
            },
        }
    }
}

/// RDS sizing for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseProfile {
    pub instance_class: &'static str,
    pub multi_az: bool,
    /// Take a final snapshot before deleting the instance
    pub final_snapshot: bool,
}

impl DatabaseProfile {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Dev => Self {
                instance_class: "db.t3.micro",
                multi_az: false,
                final_snapshot: false,
            },
            Tier::Prod => Self {
                instance_class: "db.m5.large",
                multi_az: true,
                final_snapshot: true,
            },
        }
    }
}

/// S3 bucket naming rules
pub fn validate_bucket_name(name: &StorageBucketName) -> Result<()> {
    let name = name.as_str();
    let len = name.len();
    if !(3..=63).contains(&len) {
        return Err(CloudError::validation(format!(
            "bucket name '{name}' must be 3-63 characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(CloudError::validation(format!(
            "bucket name '{name}' may only contain lowercase letters, digits, '.' and '-'"
        )));
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(CloudError::validation(format!(
            "bucket name '{name}' must start and end with a letter or digit"
        )));
    }
    if name.contains("..") {
        return Err(CloudError::validation(format!(
            "bucket name '{name}' must not contain adjacent periods"
        )));
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(CloudError::validation(format!(
            "bucket name '{name}' must not be formatted as an IP address"
        )));
    }
    Ok(())
}

/// ElastiCache replication group identifier rules
pub fn validate_replication_group_id(id: &str) -> Result<()> {
    validate_identifier("replication group id", id, MAX_REPLICATION_GROUP_ID_LEN)
}

/// RDS instance identifier rules
pub fn validate_db_instance_id(id: &str) -> Result<()> {
    validate_identifier("db instance identifier", id, MAX_DB_INSTANCE_ID_LEN)
}

/// Letters, digits and hyphens; starts with a letter; no trailing or
/// doubled hyphen
fn validate_identifier(what: &str, id: &str, max_len: usize) -> Result<()> {
    if id.is_empty() || id.len() > max_len {
        return Err(CloudError::validation(format!(
            "{what} '{id}' must be 1-{max_len} characters"
        )));
    }
    if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(CloudError::validation(format!(
            "{what} '{id}' must start with a letter"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CloudError::validation(format!(
            "{what} '{id}' may only contain letters, digits and hyphens"
        )));
    }
    if id.ends_with('-') || id.contains("--") {
        return Err(CloudError::validation(format!(
            "{what} '{id}' must not end with a hyphen or contain two consecutive hyphens"
        )));
    }
    Ok(())
}

/// `major[.minor[.patch]]`
pub fn validate_engine_version(version: &str) -> Result<()> {
    let parts: Vec<&str> = version.split('.').collect();
    let well_formed = parts.len() <= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(CloudError::validation(format!(
            "engine version '{version}' is not of the form major[.minor[.patch]]"
        )));
    }
    Ok(())
}

/// RDS limits checked before any vendor call
pub fn validate_database(db: &DatabaseDescriptor) -> Result<()> {
    validate_db_instance_id(&db.cluster_name)?;
    validate_engine_version(&db.engine_version)?;

    let name = &db.database_name;
    if name.len() > MAX_DB_NAME_LEN
        || !name.starts_with(|c: char| c.is_ascii_alphabetic())
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(CloudError::validation(format!(
            "database name '{name}' must start with a letter and contain only letters, digits and underscores (max {MAX_DB_NAME_LEN})"
        )));
    }

    if !(MIN_DB_STORAGE_GB..=MAX_DB_STORAGE_GB).contains(&db.storage_size_gb) {
        return Err(CloudError::validation(format!(
            "storage size {} GB is outside the allowed range {}-{} GB",
            db.storage_size_gb, MIN_DB_STORAGE_GB, MAX_DB_STORAGE_GB
        )));
    }

    if db.retention_period_days > MAX_BACKUP_RETENTION_DAYS {
        return Err(CloudError::validation(format!(
            "backup retention of {} days exceeds the maximum of {} days",
            db.retention_period_days, MAX_BACKUP_RETENTION_DAYS
        )));
    }

    Ok(())
}
