//! In-memory AWS control plane for tests
//!
//! Resources move through the same statuses the real services report.
//! Each describe call advances a resource one step, so a create settles
//! after `settle_after` observations. Every call yields to the runtime
//! before touching state, which lets concurrent operations interleave.

use crate::api::{
    AwsApi, BucketInfo, CallerIdentity, CreateDbInstanceRequest, CreateReplicationGroupRequest,
    DbInstance, Endpoint, ReplicationGroup,
};
use crate::error::{ApiError, ApiResult, ErrorCode};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const ACCOUNT: &str = "123456789012";

/// Call counts observed by the simulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Every call, including rejected ones
    pub calls: u32,
    pub describes: u32,
    pub bucket_creates: u32,
    pub bucket_deletes: u32,
    pub cache_creates: u32,
    pub cache_deletes: u32,
    pub db_creates: u32,
    pub db_deletes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Creating,
    Available,
    Failed(String),
    Deleting,
    DeleteFailed(String),
}

#[derive(Debug)]
struct Lifecycle {
    phase: Phase,
    remaining: u32,
    /// Outcome decided when the operation was submitted
    failure: Option<String>,
}

impl Lifecycle {
    fn creating(settle_after: u32, failure: Option<String>) -> Self {
        Self {
            phase: Phase::Creating,
            remaining: settle_after,
            failure,
        }
    }

    fn start_deleting(&mut self, settle_after: u32, failure: Option<String>) {
        self.phase = Phase::Deleting;
        self.remaining = settle_after;
        self.failure = failure;
    }

    /// Advance one observation; returns false once the resource is gone
    fn tick(&mut self, stalled: bool) -> bool {
        if stalled || !matches!(self.phase, Phase::Creating | Phase::Deleting) {
            return true;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return true;
        }
        match (&self.phase, self.failure.take()) {
            (Phase::Creating, None) => self.phase = Phase::Available,
            (Phase::Creating, Some(reason)) => self.phase = Phase::Failed(reason),
            (Phase::Deleting, None) => return false,
            (Phase::Deleting, Some(reason)) => self.phase = Phase::DeleteFailed(reason),
            _ => {}
        }
        true
    }

    fn in_flight(&self) -> bool {
        matches!(self.phase, Phase::Creating | Phase::Deleting)
    }
}

#[derive(Debug)]
struct SimBucket {
    foreign: bool,
    objects: u32,
    /// HeadBucket answers NotFound until this reaches zero
    invisible_for: u32,
    /// Set once deleted; HeadBucket still answers for this many calls
    deleting_for: Option<u32>,
}

#[derive(Debug)]
struct SimGroup {
    request: CreateReplicationGroupRequest,
    lifecycle: Lifecycle,
}

#[derive(Debug)]
struct SimInstance {
    request: CreateDbInstanceRequest,
    lifecycle: Lifecycle,
}

#[derive(Debug)]
struct World {
    settle_after: u32,
    stalled: bool,
    provisioning_failure: Option<String>,
    deletion_failure: Option<String>,
    transient_failures: u32,
    rejections: VecDeque<ApiError>,
    revoked: bool,
    buckets: BTreeMap<String, SimBucket>,
    groups: BTreeMap<String, SimGroup>,
    instances: BTreeMap<String, SimInstance>,
    final_snapshots: Vec<String>,
    counters: Counters,
}

impl World {
    /// Faults that apply to every call
    fn admit(&mut self) -> ApiResult<()> {
        self.counters.calls += 1;
        if self.revoked {
            return Err(ApiError::new(
                ErrorCode::AccessDenied,
                "the security token included in the request is invalid",
            ));
        }
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(ApiError::new(ErrorCode::Throttling, "rate exceeded"));
        }
        Ok(())
    }

    /// Faults that apply to create and delete submissions
    fn admit_submission(&mut self) -> ApiResult<()> {
        self.admit()?;
        match self.rejections.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Simulated S3, ElastiCache and RDS
pub struct SimulatedAws {
    region: String,
    world: Mutex<World>,
}

impl Default for SimulatedAws {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

impl SimulatedAws {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            world: Mutex::new(World {
                settle_after: 2,
                stalled: false,
                provisioning_failure: None,
                deletion_failure: None,
                transient_failures: 0,
                rejections: VecDeque::new(),
                revoked: false,
                buckets: BTreeMap::new(),
                groups: BTreeMap::new(),
                instances: BTreeMap::new(),
                final_snapshots: Vec::new(),
                counters: Counters::default(),
            }),
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Knobs ==========

    /// Number of describe calls before a submitted change settles
    pub fn settle_after(&self, observations: u32) -> &Self {
        self.world().settle_after = observations.max(1);
        self
    }

    /// Freeze every in-flight create or delete
    pub fn stall(&self, stalled: bool) -> &Self {
        self.world().stalled = stalled;
        self
    }

    /// Creates submitted from now on end in a failure state
    pub fn fail_provisioning(&self, reason: impl Into<String>) -> &Self {
        self.world().provisioning_failure = Some(reason.into());
        self
    }

    /// Deletes submitted from now on end in a delete-failed state
    pub fn fail_deletion(&self, reason: impl Into<String>) -> &Self {
        self.world().deletion_failure = Some(reason.into());
        self
    }

    pub fn clear_failures(&self) -> &Self {
        let mut world = self.world();
        world.provisioning_failure = None;
        world.deletion_failure = None;
        self
    }

    /// The next `count` calls fail with a throttling error
    pub fn inject_transient_failures(&self, count: u32) -> &Self {
        self.world().transient_failures = count;
        self
    }

    /// The next create or delete submission fails with `code`
    pub fn reject_next(&self, code: ErrorCode, message: impl Into<String>) -> &Self {
        self.world()
            .rejections
            .push_back(ApiError::new(code, message));
        self
    }

    /// A bucket of this name owned by some other account
    pub fn seed_foreign_bucket(&self, name: impl Into<String>) -> &Self {
        self.world().buckets.insert(
            name.into(),
            SimBucket {
                foreign: true,
                objects: 0,
                invisible_for: 0,
                deleting_for: None,
            },
        );
        self
    }

    /// Put objects into an existing bucket so it cannot be deleted
    pub fn seed_bucket_objects(&self, name: &str, objects: u32) -> &Self {
        if let Some(bucket) = self.world().buckets.get_mut(name) {
            bucket.objects = objects;
        }
        self
    }

    pub fn revoke_credentials(&self, revoked: bool) -> &Self {
        self.world().revoked = revoked;
        self
    }

    // ========== Observers ==========

    pub fn counters(&self) -> Counters {
        self.world().counters
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.world()
            .buckets
            .get(name)
            .is_some_and(|b| b.deleting_for.is_none())
    }

    /// Raw status of a replication group, without advancing it
    pub fn cache_status(&self, id: &str) -> Option<String> {
        self.world()
            .groups
            .get(id)
            .map(|g| cache_status(&g.lifecycle.phase).to_string())
    }

    /// Raw status of a db instance, without advancing it
    pub fn db_status(&self, id: &str) -> Option<String> {
        self.world()
            .instances
            .get(id)
            .map(|i| db_status(&i.lifecycle.phase).to_string())
    }

    pub fn cache_node_type(&self, id: &str) -> Option<String> {
        self.world()
            .groups
            .get(id)
            .map(|g| g.request.cache_node_type.clone())
    }

    pub fn db_request(&self, id: &str) -> Option<CreateDbInstanceRequest> {
        self.world().instances.get(id).map(|i| i.request.clone())
    }

    pub fn final_snapshots(&self) -> Vec<String> {
        self.world().final_snapshots.clone()
    }

    fn group_view(&self, id: &str, group: &SimGroup) -> ReplicationGroup {
        let request = &group.request;
        let endpoint = (group.lifecycle.phase == Phase::Available).then(|| Endpoint {
            address: format!("{id}.abc123.ng.0001.use1.cache.amazonaws.com"),
            port: 6379,
        });
        ReplicationGroup {
            id: id.to_string(),
            status: cache_status(&group.lifecycle.phase).to_string(),
            engine: request.engine.clone(),
            engine_version: request.engine_version.clone(),
            cache_node_type: request.cache_node_type.clone(),
            num_cache_clusters: request.num_cache_clusters,
            automatic_failover: request.automatic_failover,
            primary_endpoint: endpoint,
            status_reason: phase_reason(&group.lifecycle.phase),
        }
    }

    fn instance_view(&self, id: &str, instance: &SimInstance) -> DbInstance {
        let request = &instance.request;
        let endpoint = (instance.lifecycle.phase == Phase::Available).then(|| Endpoint {
            address: format!("{id}.c9akciq32.{}.rds.amazonaws.com", self.region),
            port: 5432,
        });
        let secret = request.manage_master_user_password.then(|| {
            format!(
                "arn:aws:secretsmanager:{}:{ACCOUNT}:secret:rds!db-{id}",
                self.region
            )
        });
        DbInstance {
            id: id.to_string(),
            status: db_status(&instance.lifecycle.phase).to_string(),
            engine: request.engine.clone(),
            engine_version: request.engine_version.clone(),
            db_instance_class: request.db_instance_class.clone(),
            db_name: Some(request.db_name.clone()),
            allocated_storage_gb: request.allocated_storage_gb,
            backup_retention_days: request.backup_retention_days,
            multi_az: request.multi_az,
            endpoint,
            master_user_secret_arn: secret,
            status_reason: phase_reason(&instance.lifecycle.phase),
        }
    }
}

fn cache_status(phase: &Phase) -> &'static str {
    match phase {
        Phase::Creating => "creating",
        Phase::Available => "available",
        Phase::Failed(_) => "create-failed",
        Phase::Deleting => "deleting",
        Phase::DeleteFailed(_) => "delete-failed",
    }
}

fn db_status(phase: &Phase) -> &'static str {
    match phase {
        Phase::Creating => "creating",
        Phase::Available => "available",
        Phase::Failed(_) => "failed",
        Phase::Deleting => "deleting",
        Phase::DeleteFailed(_) => "delete-failed",
    }
}

fn phase_reason(phase: &Phase) -> Option<String> {
    match phase {
        Phase::Failed(reason) | Phase::DeleteFailed(reason) => Some(reason.clone()),
        _ => None,
    }
}

#[async_trait]
impl AwsApi for SimulatedAws {
    async fn caller_identity(&self) -> ApiResult<CallerIdentity> {
        tokio::task::yield_now().await;
        self.world().admit()?;
        Ok(CallerIdentity {
            account: ACCOUNT.to_string(),
            arn: format!("arn:aws:iam::{ACCOUNT}:user/provisio"),
        })
    }

    async fn create_bucket(&self, name: &str, _region: &str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;

        if let Some(bucket) = world.buckets.get(name) {
            return Err(if bucket.foreign {
                ApiError::new(ErrorCode::BucketAlreadyExists, format!("{name} is taken"))
            } else {
                ApiError::new(ErrorCode::BucketAlreadyOwnedByYou, format!("{name} is yours"))
            });
        }

        let invisible_for = world.settle_after.saturating_sub(1);
        world.buckets.insert(
            name.to_string(),
            SimBucket {
                foreign: false,
                objects: 0,
                invisible_for,
                deleting_for: None,
            },
        );
        world.counters.bucket_creates += 1;
        Ok(())
    }

    async fn head_bucket(&self, name: &str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit()?;
        world.counters.describes += 1;
        let stalled = world.stalled;

        let Some(bucket) = world.buckets.get_mut(name) else {
            return Err(ApiError::not_found(format!("{name} does not exist")));
        };

        if let Some(remaining) = bucket.deleting_for.as_mut() {
            if !stalled {
                *remaining = remaining.saturating_sub(1);
            }
            if *remaining == 0 {
                world.buckets.remove(name);
                return Err(ApiError::not_found(format!("{name} does not exist")));
            }
            return Ok(());
        }

        if bucket.invisible_for > 0 {
            if !stalled {
                bucket.invisible_for -= 1;
            }
            return Err(ApiError::not_found(format!("{name} does not exist")));
        }
        Ok(())
    }

    async fn list_buckets(&self) -> ApiResult<Vec<BucketInfo>> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit()?;
        Ok(world
            .buckets
            .iter()
            .filter(|(_, b)| !b.foreign && b.deleting_for.is_none())
            .map(|(name, _)| BucketInfo {
                name: name.clone(),
                created_at: None,
            })
            .collect())
    }

    async fn delete_bucket(&self, name: &str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;
        let settle_after = world.settle_after;

        let Some(bucket) = world.buckets.get_mut(name) else {
            return Err(ApiError::not_found(format!("{name} does not exist")));
        };
        if bucket.foreign {
            return Err(ApiError::new(ErrorCode::AccessDenied, "access denied"));
        }
        if bucket.objects > 0 {
            return Err(ApiError::new(
                ErrorCode::BucketNotEmpty,
                "the bucket you tried to delete is not empty",
            ));
        }
        if bucket.deleting_for.is_none() {
            bucket.deleting_for = Some(settle_after);
            world.counters.bucket_deletes += 1;
        }
        Ok(())
    }

    async fn create_replication_group(
        &self,
        request: &CreateReplicationGroupRequest,
    ) -> ApiResult<ReplicationGroup> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;

        let id = request.replication_group_id.clone();
        if world.groups.contains_key(&id) {
            return Err(ApiError::new(
                ErrorCode::AlreadyExists,
                format!("replication group {id} already exists"),
            ));
        }

        let lifecycle = Lifecycle::creating(world.settle_after, world.provisioning_failure.clone());
        let group = SimGroup {
            request: request.clone(),
            lifecycle,
        };
        let view = self.group_view(&id, &group);
        world.groups.insert(id, group);
        world.counters.cache_creates += 1;
        Ok(view)
    }

    async fn describe_replication_group(&self, id: &str) -> ApiResult<ReplicationGroup> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit()?;
        world.counters.describes += 1;
        let stalled = world.stalled;

        let Some(group) = world.groups.get_mut(id) else {
            return Err(ApiError::not_found(format!("replication group {id} not found")));
        };
        if !group.lifecycle.tick(stalled) {
            world.groups.remove(id);
            return Err(ApiError::not_found(format!("replication group {id} not found")));
        }
        Ok(self.group_view(id, group))
    }

    async fn delete_replication_group(&self, id: &str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;
        let settle_after = world.settle_after;
        let failure = world.deletion_failure.clone();

        let Some(group) = world.groups.get_mut(id) else {
            return Err(ApiError::not_found(format!("replication group {id} not found")));
        };
        if group.lifecycle.in_flight() {
            return Err(ApiError::new(
                ErrorCode::InvalidState,
                format!("replication group {id} is {}", cache_status(&group.lifecycle.phase)),
            ));
        }
        group.lifecycle.start_deleting(settle_after, failure);
        world.counters.cache_deletes += 1;
        Ok(())
    }

    async fn create_db_instance(&self, request: &CreateDbInstanceRequest) -> ApiResult<DbInstance> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;

        let id = request.db_instance_identifier.clone();
        if world.instances.contains_key(&id) {
            return Err(ApiError::new(
                ErrorCode::AlreadyExists,
                format!("DB instance {id} already exists"),
            ));
        }

        let lifecycle = Lifecycle::creating(world.settle_after, world.provisioning_failure.clone());
        let instance = SimInstance {
            request: request.clone(),
            lifecycle,
        };
        let view = self.instance_view(&id, &instance);
        world.instances.insert(id, instance);
        world.counters.db_creates += 1;
        Ok(view)
    }

    async fn describe_db_instance(&self, id: &str) -> ApiResult<DbInstance> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit()?;
        world.counters.describes += 1;
        let stalled = world.stalled;

        let Some(instance) = world.instances.get_mut(id) else {
            return Err(ApiError::not_found(format!("DBInstance {id} not found")));
        };
        if !instance.lifecycle.tick(stalled) {
            world.instances.remove(id);
            return Err(ApiError::not_found(format!("DBInstance {id} not found")));
        }
        Ok(self.instance_view(id, instance))
    }

    async fn delete_db_instance(
        &self,
        id: &str,
        final_snapshot_id: Option<&str>,
    ) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut world = self.world();
        world.admit_submission()?;
        let settle_after = world.settle_after;
        let failure = world.deletion_failure.clone();

        let Some(instance) = world.instances.get_mut(id) else {
            return Err(ApiError::not_found(format!("DBInstance {id} not found")));
        };
        if instance.lifecycle.in_flight() {
            return Err(ApiError::new(
                ErrorCode::InvalidState,
                format!("instance {id} is not in available state"),
            ));
        }
        instance.lifecycle.start_deleting(settle_after, failure);
        world.counters.db_deletes += 1;
        if let Some(snapshot) = final_snapshot_id {
            world.final_snapshots.push(snapshot.to_string());
        }
        Ok(())
    }
}
