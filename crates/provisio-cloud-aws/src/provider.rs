//! AWS provider implementation
//!
//! Every operation rehydrates from the vendor first (describe), then either
//! adopts what it finds or submits a new request, and finally polls until
//! the resource reaches a terminal state. Nothing is cached between calls.

use crate::api::{
    AwsApi, CreateDbInstanceRequest, CreateReplicationGroupRequest, DbInstance, ReplicationGroup,
    Tag,
};
use crate::error::{ApiResult, ErrorCode};
use crate::sizing::{
    CacheProfile, DatabaseProfile, validate_bucket_name, validate_database,
    validate_engine_version, validate_replication_group_id,
};
use crate::status::{cache_state, database_state, failure_reason};
use async_trait::async_trait;
use provisio_cloud::{
    AuthStatus, CacheDescriptor, CloudError, CloudProvider, Coordinates, CredentialsRef,
    DatabaseDescriptor, OperationContext, PollConfig, PollStep, ProvisioningState, Result,
    RetryConfig, StateTracker, StorageBucketName, Tier, poll_until, retry_transient,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

pub const MANAGED_BY_TAG: &str = "managed-by";
pub const MANAGED_BY_VALUE: &str = "provisio";
pub const TIER_TAG: &str = "tier";

const SECRETS_STORE: &str = "secretsmanager";

/// Configuration of one AWS backend handle
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,

    /// Where the account credentials come from (e.g. `env:AWS_PROFILE`)
    pub credentials_ref: Option<String>,

    /// Master user created on new database instances
    pub master_username: String,

    /// Tags added to every resource next to the managed-by and tier tags
    pub extra_tags: BTreeMap<String, String>,

    pub poll: PollConfig,

    pub retry: RetryConfig,
}

impl AwsSettings {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credentials_ref: None,
            master_username: "provisio".to_string(),
            extra_tags: BTreeMap::new(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_credentials_ref(mut self, credentials_ref: impl Into<String>) -> Self {
        self.credentials_ref = Some(credentials_ref.into());
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.extra_tags = tags;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// AWS provider
pub struct AwsProvider {
    api: Arc<dyn AwsApi>,
    settings: AwsSettings,
}

impl AwsProvider {
    pub fn new(api: Arc<dyn AwsApi>, settings: AwsSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &AwsSettings {
        &self.settings
    }

    /// Run one vendor call under the transient retry policy
    async fn call<T, F, Fut>(
        &self,
        resource: &str,
        operation: &str,
        ctx: &OperationContext,
        call: F,
    ) -> Result<ApiResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        retry_transient(&self.settings.retry, resource, operation, ctx, call).await
    }

    fn tags(&self, tier: Tier) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new(MANAGED_BY_TAG, MANAGED_BY_VALUE),
            Tag::new(TIER_TAG, tier.as_str()),
        ];
        tags.extend(
            self.settings
                .extra_tags
                .iter()
                .filter(|(key, _)| key.as_str() != MANAGED_BY_TAG && key.as_str() != TIER_TAG)
                .map(|(key, value)| Tag::new(key.as_str(), value.as_str())),
        );
        tags
    }

    // ========== Storage ==========

    async fn bucket_visible_step(
        &self,
        bucket: &str,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<PollStep<()>> {
        let api = &self.api;
        match self
            .call(resource, "HeadBucket", ctx, move || api.head_bucket(bucket))
            .await?
        {
            Ok(()) => Ok(PollStep::Done(())),
            Err(e) if e.is(ErrorCode::NotFound) => Ok(PollStep::Pending("not-visible".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn bucket_gone_step(
        &self,
        bucket: &str,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<PollStep<()>> {
        let api = &self.api;
        match self
            .call(resource, "HeadBucket", ctx, move || api.head_bucket(bucket))
            .await?
        {
            Ok(()) => Ok(PollStep::Pending("still-visible".to_string())),
            Err(e) if e.is(ErrorCode::NotFound) => Ok(PollStep::Done(())),
            Err(e) => Err(e.into()),
        }
    }

    // ========== Cache ==========

    async fn describe_cache(
        &self,
        resource: &str,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<Option<ReplicationGroup>> {
        let api = &self.api;
        match self
            .call(resource, "DescribeReplicationGroups", ctx, move || {
                api.describe_replication_group(id)
            })
            .await?
        {
            Ok(group) => Ok(Some(group)),
            Err(e) if e.is(ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn submit_cache(
        &self,
        cache: &CacheDescriptor,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<()> {
        let profile = CacheProfile::for_tier(cache.tier);
        let request = CreateReplicationGroupRequest {
            replication_group_id: cache.cluster_name.clone(),
            description: format!("{} {} cache ({})", cache.engine, cache.engine_version, cache.tier),
            engine: cache.engine.as_str().to_string(),
            engine_version: cache.engine_version.clone(),
            cache_node_type: profile.node_type.to_string(),
            num_cache_clusters: profile.num_cache_clusters,
            automatic_failover: profile.automatic_failover,
            tags: self.tags(cache.tier),
        };

        let api = &self.api;
        let req = &request;
        match self
            .call(resource, "CreateReplicationGroup", ctx, move || {
                api.create_replication_group(req)
            })
            .await?
        {
            Ok(group) => {
                tracing::info!(
                    resource = %resource,
                    node_type = %group.cache_node_type,
                    "submitted replication group"
                );
                observe(tracker, cache_state(&group.status), &group.status);
                Ok(())
            }
            Err(e) if e.is(ErrorCode::AlreadyExists) => {
                // Another caller won the creation; attach to theirs
                let group = self
                    .describe_cache(resource, &cache.cluster_name, ctx)
                    .await?
                    .ok_or_else(|| {
                        CloudError::conflict(format!(
                            "{resource} was removed while another caller was creating it"
                        ))
                    })?;
                ensure_cache_matches(cache, &group)?;
                tracing::info!(resource = %resource, "attached to concurrent creation");
                observe(tracker, cache_state(&group.status), &group.status);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cache_ready_step(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<PollStep<Coordinates>> {
        let Some(group) = self.describe_cache(resource, id, ctx).await? else {
            return Err(CloudError::provisioning(
                resource,
                "replication group disappeared while provisioning",
            ));
        };

        let state = cache_state(&group.status);
        observe(tracker, state, &group.status);

        match state {
            ProvisioningState::Available => match group.primary_endpoint {
                Some(endpoint) => Ok(PollStep::Done(Coordinates::new(
                    endpoint.address,
                    endpoint.port,
                ))),
                None => Ok(PollStep::Pending("available-without-endpoint".to_string())),
            },
            ProvisioningState::Failed => Err(CloudError::provisioning(
                resource,
                failure_reason(&group.status, group.status_reason.as_deref()),
            )),
            ProvisioningState::Deleting
            | ProvisioningState::Deleted
            | ProvisioningState::DeleteFailed => Err(CloudError::provisioning(
                resource,
                format!("entered '{}' while provisioning", group.status),
            )),
            ProvisioningState::Requested | ProvisioningState::Provisioning => {
                Ok(PollStep::Pending(group.status))
            }
        }
    }

    /// Wait for an in-flight create/modify to finish; `Deleted` if it vanished
    async fn cache_settled_step(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<PollStep<ProvisioningState>> {
        match self.describe_cache(resource, id, ctx).await? {
            None => Ok(PollStep::Done(ProvisioningState::Deleted)),
            Some(group) => match cache_state(&group.status) {
                ProvisioningState::Provisioning => Ok(PollStep::Pending(group.status)),
                settled => Ok(PollStep::Done(settled)),
            },
        }
    }

    /// Returns false if the group turned out to be already gone
    async fn submit_cache_delete(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<bool> {
        let api = &self.api;
        match self
            .call(resource, "DeleteReplicationGroup", ctx, move || {
                api.delete_replication_group(id)
            })
            .await?
        {
            Ok(()) => Ok(true),
            Err(e) if e.is(ErrorCode::NotFound) => Ok(false),
            Err(e) if e.is(ErrorCode::InvalidState) => {
                match self.describe_cache(resource, id, ctx).await? {
                    None => Ok(false),
                    Some(group) if cache_state(&group.status) == ProvisioningState::Deleting => {
                        Ok(true)
                    }
                    Some(_) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cache_gone_step(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<PollStep<()>> {
        let Some(group) = self.describe_cache(resource, id, ctx).await? else {
            return Ok(PollStep::Done(()));
        };

        let state = cache_state(&group.status);
        observe(tracker, state, &group.status);

        if state == ProvisioningState::DeleteFailed {
            return Err(CloudError::delete_failed(
                resource,
                failure_reason(&group.status, group.status_reason.as_deref()),
            ));
        }
        Ok(PollStep::Pending(group.status))
    }

    // ========== Database ==========

    async fn describe_database(
        &self,
        resource: &str,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<Option<DbInstance>> {
        let api = &self.api;
        match self
            .call(resource, "DescribeDBInstances", ctx, move || {
                api.describe_db_instance(id)
            })
            .await?
        {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if e.is(ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn submit_database(
        &self,
        db: &DatabaseDescriptor,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<()> {
        let profile = DatabaseProfile::for_tier(db.tier);
        let request = CreateDbInstanceRequest {
            db_instance_identifier: db.cluster_name.clone(),
            db_name: db.database_name.clone(),
            engine: db.engine.as_str().to_string(),
            engine_version: db.engine_version.clone(),
            db_instance_class: profile.instance_class.to_string(),
            allocated_storage_gb: db.storage_size_gb,
            backup_retention_days: db.retention_period_days,
            multi_az: profile.multi_az,
            master_username: self.settings.master_username.clone(),
            manage_master_user_password: true,
            tags: self.tags(db.tier),
        };

        let api = &self.api;
        let req = &request;
        match self
            .call(resource, "CreateDBInstance", ctx, move || {
                api.create_db_instance(req)
            })
            .await?
        {
            Ok(instance) => {
                tracing::info!(
                    resource = %resource,
                    instance_class = %instance.db_instance_class,
                    storage_gb = instance.allocated_storage_gb,
                    "submitted db instance"
                );
                observe(tracker, database_state(&instance.status), &instance.status);
                Ok(())
            }
            Err(e) if e.is(ErrorCode::AlreadyExists) => {
                let instance = self
                    .describe_database(resource, &db.cluster_name, ctx)
                    .await?
                    .ok_or_else(|| {
                        CloudError::conflict(format!(
                            "{resource} was removed while another caller was creating it"
                        ))
                    })?;
                ensure_database_matches(db, &instance)?;
                tracing::info!(resource = %resource, "attached to concurrent creation");
                observe(tracker, database_state(&instance.status), &instance.status);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn database_ready_step(
        &self,
        db: &DatabaseDescriptor,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<PollStep<Coordinates>> {
        let Some(instance) = self
            .describe_database(resource, &db.cluster_name, ctx)
            .await?
        else {
            return Err(CloudError::provisioning(
                resource,
                "db instance disappeared while provisioning",
            ));
        };

        let state = database_state(&instance.status);
        observe(tracker, state, &instance.status);

        match state {
            ProvisioningState::Available => {
                let Some(endpoint) = instance.endpoint else {
                    return Ok(PollStep::Pending("available-without-endpoint".to_string()));
                };
                let database = instance.db_name.unwrap_or_else(|| db.database_name.clone());
                let mut coordinates =
                    Coordinates::new(endpoint.address, endpoint.port).with_database(database);
                match instance.master_user_secret_arn {
                    Some(arn) => {
                        coordinates =
                            coordinates.with_credentials(CredentialsRef::new(SECRETS_STORE, arn));
                    }
                    None => {
                        tracing::warn!(
                            resource = %resource,
                            "instance has no managed master secret; coordinates carry no credentials reference"
                        );
                    }
                }
                Ok(PollStep::Done(coordinates))
            }
            ProvisioningState::Failed => Err(CloudError::provisioning(
                resource,
                failure_reason(&instance.status, instance.status_reason.as_deref()),
            )),
            ProvisioningState::Deleting
            | ProvisioningState::Deleted
            | ProvisioningState::DeleteFailed => Err(CloudError::provisioning(
                resource,
                format!("entered '{}' while provisioning", instance.status),
            )),
            ProvisioningState::Requested | ProvisioningState::Provisioning => {
                Ok(PollStep::Pending(instance.status))
            }
        }
    }

    async fn database_settled_step(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<PollStep<ProvisioningState>> {
        match self.describe_database(resource, id, ctx).await? {
            None => Ok(PollStep::Done(ProvisioningState::Deleted)),
            Some(instance) => match database_state(&instance.status) {
                ProvisioningState::Provisioning => Ok(PollStep::Pending(instance.status)),
                settled => Ok(PollStep::Done(settled)),
            },
        }
    }

    async fn submit_database_delete(
        &self,
        db: &DatabaseDescriptor,
        resource: &str,
        ctx: &OperationContext,
    ) -> Result<bool> {
        let id = db.cluster_name.as_str();
        let snapshot_id = DatabaseProfile::for_tier(db.tier).final_snapshot.then(|| {
            format!("{}-final-{}", id, chrono::Utc::now().format("%Y%m%d%H%M%S"))
        });
        let snapshot = snapshot_id.as_deref();

        let api = &self.api;
        match self
            .call(resource, "DeleteDBInstance", ctx, move || {
                api.delete_db_instance(id, snapshot)
            })
            .await?
        {
            Ok(()) => {
                if let Some(snapshot) = snapshot {
                    tracing::info!(resource = %resource, snapshot = %snapshot, "final snapshot requested");
                }
                Ok(true)
            }
            Err(e) if e.is(ErrorCode::NotFound) => Ok(false),
            Err(e) if e.is(ErrorCode::InvalidState) => {
                match self.describe_database(resource, id, ctx).await? {
                    None => Ok(false),
                    Some(instance)
                        if database_state(&instance.status) == ProvisioningState::Deleting =>
                    {
                        Ok(true)
                    }
                    Some(_) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn database_gone_step(
        &self,
        id: &str,
        resource: &str,
        ctx: &OperationContext,
        tracker: &Mutex<StateTracker>,
    ) -> Result<PollStep<()>> {
        let Some(instance) = self.describe_database(resource, id, ctx).await? else {
            return Ok(PollStep::Done(()));
        };

        let state = database_state(&instance.status);
        observe(tracker, state, &instance.status);

        if state == ProvisioningState::DeleteFailed {
            return Err(CloudError::delete_failed(
                resource,
                failure_reason(&instance.status, instance.status_reason.as_deref()),
            ));
        }
        Ok(PollStep::Pending(instance.status))
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        let source = self.settings.credentials_ref.as_deref().unwrap_or("default chain");
        match self.api.caller_identity().await {
            Ok(identity) => {
                tracing::debug!(account = %identity.account, credentials = %source, "authenticated");
                Ok(AuthStatus::ok(format!(
                    "{} ({}) via {source}",
                    identity.arn, identity.account
                )))
            }
            Err(e) => {
                tracing::warn!(credentials = %source, error = %e, "authentication failed");
                Ok(AuthStatus::failed(format!("{e} (credentials: {source})")))
            }
        }
    }

    async fn create_storage(
        &self,
        name: &StorageBucketName,
        ctx: &OperationContext,
    ) -> Result<()> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        validate_bucket_name(name)?;
        let key = format!("storage/{name}");
        let resource = key.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let bucket = name.as_str();
        let region = self.settings.region.as_str();

        let api = &self.api;
        match self
            .call(resource, "CreateBucket", ctx, move || {
                api.create_bucket(bucket, region)
            })
            .await?
        {
            Ok(()) => observe(&tracker, ProvisioningState::Provisioning, "creating"),
            Err(e) if e.is(ErrorCode::BucketAlreadyOwnedByYou) => {
                tracing::info!(bucket = %name, "bucket already owned by this account");
            }
            Err(e) if e.is(ErrorCode::BucketAlreadyExists) => {
                return Err(CloudError::conflict(format!(
                    "bucket '{name}' exists under another account"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        poll_until(&self.settings.poll, resource, ctx, move || {
            self.bucket_visible_step(bucket, resource, ctx)
        })
        .await?;
        observe(&tracker, ProvisioningState::Available, "exists");
        Ok(())
    }

    async fn list_storage(&self, ctx: &OperationContext) -> Result<Vec<StorageBucketName>> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        let api = &self.api;
        let buckets = self
            .call("storage", "ListBuckets", ctx, move || api.list_buckets())
            .await??;

        let mut names: Vec<StorageBucketName> = buckets
            .into_iter()
            .map(|b| StorageBucketName::new(b.name))
            .collect();
        names.sort();

        tracing::info!(
            count = names.len(),
            buckets = %names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(","),
            "storage inventory"
        );
        Ok(names)
    }

    async fn remove_storage(
        &self,
        name: &StorageBucketName,
        ctx: &OperationContext,
    ) -> Result<()> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        validate_bucket_name(name)?;
        let key = format!("storage/{name}");
        let resource = key.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let bucket = name.as_str();

        let api = &self.api;
        match self
            .call(resource, "DeleteBucket", ctx, move || api.delete_bucket(bucket))
            .await?
        {
            Ok(()) => observe(&tracker, ProvisioningState::Deleting, "deleting"),
            Err(e) if e.is(ErrorCode::NotFound) => {
                tracing::info!(bucket = %name, "bucket already absent");
                observe(&tracker, ProvisioningState::Deleted, "absent");
                return Ok(());
            }
            Err(e) if e.is(ErrorCode::BucketNotEmpty) => {
                return Err(CloudError::conflict(format!(
                    "bucket '{name}' is not empty"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        poll_until(&self.settings.poll, resource, ctx, move || {
            self.bucket_gone_step(bucket, resource, ctx)
        })
        .await?;
        observe(&tracker, ProvisioningState::Deleted, "absent");
        Ok(())
    }

    async fn create_cache(
        &self,
        cache: &CacheDescriptor,
        ctx: &OperationContext,
    ) -> Result<Coordinates> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        cache.validate()?;
        validate_replication_group_id(&cache.cluster_name)?;
        validate_engine_version(&cache.engine_version)?;

        let key = cache.resource_key();
        let resource = key.as_str();
        let id = cache.cluster_name.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let tracker_ref = &tracker;

        match self.describe_cache(resource, id, ctx).await? {
            None => self.submit_cache(cache, resource, ctx, tracker_ref).await?,
            Some(group) => {
                let state = cache_state(&group.status);
                observe(tracker_ref, state, &group.status);
                if state == ProvisioningState::Deleting {
                    tracing::info!(
                        resource = %resource,
                        "previous cluster still deleting; waiting before re-creating"
                    );
                    poll_until(&self.settings.poll, resource, ctx, move || {
                        self.cache_gone_step(id, resource, ctx, tracker_ref)
                    })
                    .await?;
                    observe(tracker_ref, ProvisioningState::Deleted, "absent");
                    self.submit_cache(cache, resource, ctx, tracker_ref).await?;
                } else {
                    ensure_cache_matches(cache, &group)?;
                    tracing::info!(
                        resource = %resource,
                        status = %group.status,
                        "adopting existing replication group"
                    );
                }
            }
        }

        let coordinates = poll_until(&self.settings.poll, resource, ctx, move || {
            self.cache_ready_step(id, resource, ctx, tracker_ref)
        })
        .await?;

        tracing::info!(resource = %resource, coordinates = %coordinates, "cache available");
        Ok(coordinates)
    }

    async fn remove_cache(&self, cache: &CacheDescriptor, ctx: &OperationContext) -> Result<()> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        cache.validate()?;
        validate_replication_group_id(&cache.cluster_name)?;

        let key = cache.resource_key();
        let resource = key.as_str();
        let id = cache.cluster_name.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let tracker_ref = &tracker;

        let Some(group) = self.describe_cache(resource, id, ctx).await? else {
            tracing::info!(resource = %resource, "cache already absent");
            observe(tracker_ref, ProvisioningState::Deleted, "absent");
            return Ok(());
        };

        let mut state = cache_state(&group.status);
        observe(tracker_ref, state, &group.status);

        if state == ProvisioningState::Provisioning {
            tracing::info!(resource = %resource, "waiting for in-flight change before deleting");
            state = poll_until(&self.settings.poll, resource, ctx, move || {
                self.cache_settled_step(id, resource, ctx)
            })
            .await?;
        }

        let present = match state {
            ProvisioningState::Deleted => false,
            ProvisioningState::Deleting => true,
            _ => self.submit_cache_delete(id, resource, ctx).await?,
        };

        if present {
            observe(tracker_ref, ProvisioningState::Deleting, "deleting");
            poll_until(&self.settings.poll, resource, ctx, move || {
                self.cache_gone_step(id, resource, ctx, tracker_ref)
            })
            .await?;
        }

        observe(tracker_ref, ProvisioningState::Deleted, "absent");
        Ok(())
    }

    async fn create_database(
        &self,
        database: &DatabaseDescriptor,
        ctx: &OperationContext,
    ) -> Result<Coordinates> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        database.validate()?;
        validate_database(database)?;

        let key = database.resource_key();
        let resource = key.as_str();
        let id = database.cluster_name.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let tracker_ref = &tracker;

        match self.describe_database(resource, id, ctx).await? {
            None => {
                self.submit_database(database, resource, ctx, tracker_ref)
                    .await?
            }
            Some(instance) => {
                let state = database_state(&instance.status);
                observe(tracker_ref, state, &instance.status);
                if state == ProvisioningState::Deleting {
                    tracing::info!(
                        resource = %resource,
                        "previous instance still deleting; waiting before re-creating"
                    );
                    poll_until(&self.settings.poll, resource, ctx, move || {
                        self.database_gone_step(id, resource, ctx, tracker_ref)
                    })
                    .await?;
                    observe(tracker_ref, ProvisioningState::Deleted, "absent");
                    self.submit_database(database, resource, ctx, tracker_ref)
                        .await?;
                } else {
                    ensure_database_matches(database, &instance)?;
                    tracing::info!(
                        resource = %resource,
                        status = %instance.status,
                        "adopting existing db instance"
                    );
                }
            }
        }

        let coordinates = poll_until(&self.settings.poll, resource, ctx, move || {
            self.database_ready_step(database, resource, ctx, tracker_ref)
        })
        .await?;

        tracing::info!(resource = %resource, coordinates = %coordinates, "database available");
        Ok(coordinates)
    }

    async fn remove_database(
        &self,
        database: &DatabaseDescriptor,
        ctx: &OperationContext,
    ) -> Result<()> {
        let ctx = &ctx.start(self.settings.poll.timeout);
        database.validate()?;
        crate::sizing::validate_db_instance_id(&database.cluster_name)?;

        let key = database.resource_key();
        let resource = key.as_str();
        let id = database.cluster_name.as_str();
        let tracker = Mutex::new(StateTracker::new(resource));
        let tracker_ref = &tracker;

        let Some(instance) = self.describe_database(resource, id, ctx).await? else {
            tracing::info!(resource = %resource, "database already absent");
            observe(tracker_ref, ProvisioningState::Deleted, "absent");
            return Ok(());
        };

        let mut state = database_state(&instance.status);
        observe(tracker_ref, state, &instance.status);

        if state == ProvisioningState::Provisioning {
            tracing::info!(resource = %resource, "waiting for in-flight change before deleting");
            state = poll_until(&self.settings.poll, resource, ctx, move || {
                self.database_settled_step(id, resource, ctx)
            })
            .await?;
        }

        let present = match state {
            ProvisioningState::Deleted => false,
            ProvisioningState::Deleting => true,
            _ => self.submit_database_delete(database, resource, ctx).await?,
        };

        if present {
            observe(tracker_ref, ProvisioningState::Deleting, "deleting");
            poll_until(&self.settings.poll, resource, ctx, move || {
                self.database_gone_step(id, resource, ctx, tracker_ref)
            })
            .await?;
        }

        observe(tracker_ref, ProvisioningState::Deleted, "absent");
        Ok(())
    }
}

fn observe(tracker: &Mutex<StateTracker>, state: ProvisioningState, vendor_status: &str) {
    tracker
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .observe(state, Some(vendor_status));
}

/// AWS reports full versions ("9.6.22") for a requested "9.6"
fn version_matches(requested: &str, actual: &str) -> bool {
    actual == requested
        || actual
            .strip_prefix(requested)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn ensure_cache_matches(cache: &CacheDescriptor, group: &ReplicationGroup) -> Result<()> {
    let profile = CacheProfile::for_tier(cache.tier);
    let mut diffs = Vec::new();

    if !group.engine.eq_ignore_ascii_case(cache.engine.as_str()) {
        diffs.push(format!("engine {} (requested {})", group.engine, cache.engine));
    }
    if !version_matches(&cache.engine_version, &group.engine_version) {
        diffs.push(format!(
            "engine version {} (requested {})",
            group.engine_version, cache.engine_version
        ));
    }
    if group.cache_node_type != profile.node_type {
        diffs.push(format!(
            "node type {} (tier {} requires {})",
            group.cache_node_type, cache.tier, profile.node_type
        ));
    }

    if diffs.is_empty() {
        Ok(())
    } else {
        Err(CloudError::conflict(format!(
            "cache cluster '{}' already exists with {}",
            cache.cluster_name,
            diffs.join(", ")
        )))
    }
}

fn ensure_database_matches(db: &DatabaseDescriptor, instance: &DbInstance) -> Result<()> {
    let profile = DatabaseProfile::for_tier(db.tier);
    let mut diffs = Vec::new();

    if !instance.engine.eq_ignore_ascii_case(db.engine.as_str()) {
        diffs.push(format!("engine {} (requested {})", instance.engine, db.engine));
    }
    if !version_matches(&db.engine_version, &instance.engine_version) {
        diffs.push(format!(
            "engine version {} (requested {})",
            instance.engine_version, db.engine_version
        ));
    }
    if instance.db_instance_class != profile.instance_class {
        diffs.push(format!(
            "instance class {} (tier {} requires {})",
            instance.db_instance_class, db.tier, profile.instance_class
        ));
    }
    if let Some(name) = instance
        .db_name
        .as_ref()
        .filter(|name| **name != db.database_name)
    {
        diffs.push(format!(
            "database name {} (requested {})",
            name, db.database_name
        ));
    }

    if instance.allocated_storage_gb != db.storage_size_gb
        || instance.backup_retention_days != db.retention_period_days
    {
        tracing::debug!(
            instance = %instance.id,
            storage_gb = instance.allocated_storage_gb,
            retention_days = instance.backup_retention_days,
            "existing instance differs in storage or retention; left unchanged"
        );
    }

    if diffs.is_empty() {
        Ok(())
    } else {
        Err(CloudError::conflict(format!(
            "db instance '{}' already exists with {}",
            db.cluster_name,
            diffs.join(", ")
        )))
    }
}
