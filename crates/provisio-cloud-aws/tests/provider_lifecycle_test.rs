use provisio_cloud::{
    CacheDescriptor, CacheEngine, CancellationToken, CloudError, CloudProvider,
    DatabaseDescriptor, DatabaseEngine, ErrorKind, OperationContext, StorageBucketName, Tier,
};
use async_trait::async_trait;
use provisio_cloud_aws::api::{
    BucketInfo, CallerIdentity, CreateDbInstanceRequest, CreateReplicationGroupRequest,
    DbInstance, ReplicationGroup,
};
use provisio_cloud_aws::testing::SimulatedAws;
use provisio_cloud_aws::{ApiResult, AwsApi, AwsProvider, AwsSettings, ErrorCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn setup() -> (Arc<SimulatedAws>, AwsProvider) {
    init_tracing();
    let sim = Arc::new(SimulatedAws::new("us-east-1"));
    let provider = AwsProvider::new(sim.clone(), AwsSettings::new("us-east-1"));
    (sim, provider)
}

fn cache(tier: Tier) -> CacheDescriptor {
    CacheDescriptor::new("c1", CacheEngine::Redis, "3.2.4", tier)
}

fn database(tier: Tier) -> DatabaseDescriptor {
    DatabaseDescriptor {
        cluster_name: "mycluster".to_string(),
        engine: DatabaseEngine::Postgres,
        engine_version: "9.6".to_string(),
        database_name: "mydb".to_string(),
        tier,
        retention_period_days: 7,
        storage_size_gb: 50,
    }
}

/// Delegates to the simulator, but replication group creates never return
struct HangingCreate {
    inner: Arc<SimulatedAws>,
}

#[async_trait]
impl AwsApi for HangingCreate {
    async fn caller_identity(&self) -> ApiResult<CallerIdentity> {
        self.inner.caller_identity().await
    }

    async fn create_bucket(&self, name: &str, region: &str) -> ApiResult<()> {
        self.inner.create_bucket(name, region).await
    }

    async fn head_bucket(&self, name: &str) -> ApiResult<()> {
        self.inner.head_bucket(name).await
    }

    async fn list_buckets(&self) -> ApiResult<Vec<BucketInfo>> {
        self.inner.list_buckets().await
    }

    async fn delete_bucket(&self, name: &str) -> ApiResult<()> {
        self.inner.delete_bucket(name).await
    }

    async fn create_replication_group(
        &self,
        request: &CreateReplicationGroupRequest,
    ) -> ApiResult<ReplicationGroup> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.inner.create_replication_group(request).await
    }

    async fn describe_replication_group(&self, id: &str) -> ApiResult<ReplicationGroup> {
        self.inner.describe_replication_group(id).await
    }

    async fn delete_replication_group(&self, id: &str) -> ApiResult<()> {
        self.inner.delete_replication_group(id).await
    }

    async fn create_db_instance(
        &self,
        request: &CreateDbInstanceRequest,
    ) -> ApiResult<DbInstance> {
        self.inner.create_db_instance(request).await
    }

    async fn describe_db_instance(&self, id: &str) -> ApiResult<DbInstance> {
        self.inner.describe_db_instance(id).await
    }

    async fn delete_db_instance(
        &self,
        id: &str,
        final_snapshot_id: Option<&str>,
    ) -> ApiResult<()> {
        self.inner.delete_db_instance(id, final_snapshot_id).await
    }
}

fn hanging_setup() -> (Arc<SimulatedAws>, AwsProvider) {
    init_tracing();
    let sim = Arc::new(SimulatedAws::new("us-east-1"));
    let api = Arc::new(HangingCreate { inner: sim.clone() });
    (sim, AwsProvider::new(api, AwsSettings::new("us-east-1")))
}

// ========== Storage ==========

/// A second create adopts the bucket instead of failing
#[tokio::test(start_paused = true)]
async fn test_create_storage_is_idempotent() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();
    let name = StorageBucketName::new("test-operator-bucket");

    assert_ok!(provider.create_storage(&name, &ctx).await);
    assert_ok!(provider.create_storage(&name, &ctx).await);

    assert_eq!(sim.counters().bucket_creates, 1);
    let listed = provider.list_storage(&ctx).await.unwrap();
    assert_eq!(listed, vec![name]);
}

#[tokio::test(start_paused = true)]
async fn test_list_storage_is_sorted() {
    let (_sim, provider) = setup();
    let ctx = OperationContext::new();

    for name in ["zeta-bucket", "alpha-bucket", "mid-bucket"] {
        provider
            .create_storage(&StorageBucketName::new(name), &ctx)
            .await
            .unwrap();
    }

    let listed: Vec<String> = provider
        .list_storage(&ctx)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.as_str().to_string())
        .collect();
    assert_eq!(listed, vec!["alpha-bucket", "mid-bucket", "zeta-bucket"]);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_bucket_is_conflict() {
    let (sim, provider) = setup();
    sim.seed_foreign_bucket("taken-bucket");

    let err = provider
        .create_storage(&"taken-bucket".into(), &OperationContext::new())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test(start_paused = true)]
async fn test_remove_storage() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();
    let name = StorageBucketName::new("test-operator-bucket");

    provider.create_storage(&name, &ctx).await.unwrap();
    assert_ok!(provider.remove_storage(&name, &ctx).await);
    assert!(!sim.bucket_exists("test-operator-bucket"));

    // Already absent
    assert_ok!(provider.remove_storage(&name, &ctx).await);
    assert_eq!(sim.counters().bucket_deletes, 1);
    assert!(provider.list_storage(&ctx).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remove_non_empty_bucket_is_conflict() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();
    let name = StorageBucketName::new("full-bucket");

    provider.create_storage(&name, &ctx).await.unwrap();
    sim.seed_bucket_objects("full-bucket", 3);

    let err = assert_err!(provider.remove_storage(&name, &ctx).await);
    assert!(err.is_conflict());
    assert!(sim.bucket_exists("full-bucket"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_bucket_name_makes_no_call() {
    let (sim, provider) = setup();

    let err = provider
        .create_storage(&"Not_A_Bucket".into(), &OperationContext::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(sim.counters().calls, 0);
}

// ========== Cache ==========

#[tokio::test(start_paused = true)]
async fn test_create_cache_returns_coordinates() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    let coords = provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    assert_eq!(coords.port, 6379);
    assert!(coords.host.starts_with("c1."));
    assert!(coords.credentials.is_none());
    assert_eq!(sim.cache_status("c1").as_deref(), Some("available"));
    assert_eq!(sim.cache_node_type("c1").as_deref(), Some("cache.t3.micro"));
}

/// Same descriptor twice yields the same coordinates and one vendor create
#[tokio::test(start_paused = true)]
async fn test_create_cache_is_idempotent() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    let first = provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    let second = provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(sim.counters().cache_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_tier_change_is_conflict() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    let err = provider
        .create_cache(&cache(Tier::Prod), &ctx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(sim.cache_node_type("c1").as_deref(), Some("cache.t3.micro"));
    assert_eq!(sim.counters().cache_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_share_one_resource() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();
    let desc = cache(Tier::Dev);

    let (a, b) = tokio::join!(
        provider.create_cache(&desc, &ctx),
        provider.create_cache(&desc, &ctx)
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(sim.counters().cache_creates, 1);
}

/// A timed-out create is re-attached by the next call, not duplicated
#[tokio::test(start_paused = true)]
async fn test_timeout_then_reattach() {
    let (sim, provider) = setup();
    sim.stall(true);

    let ctx = OperationContext::new().with_timeout(Duration::from_secs(60));
    let err = provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert_eq!(sim.cache_status("c1").as_deref(), Some("creating"));

    sim.stall(false);
    let coords = provider
        .create_cache(&cache(Tier::Dev), &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(coords.port, 6379);
    assert_eq!(sim.counters().cache_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_waiting() {
    let (sim, provider) = setup();
    sim.stall(true);

    let token = CancellationToken::new();
    let ctx = OperationContext::new().with_cancellation(token.clone());
    let started = tokio::time::Instant::now();

    let spec = cache(Tier::Dev);
    let (result, ()) = tokio::join!(provider.create_cache(&spec, &ctx), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(6));
    // The submitted create is left running
    assert_eq!(sim.cache_status("c1").as_deref(), Some("creating"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_absorbed() {
    let (sim, provider) = setup();
    sim.inject_transient_failures(2);

    assert_ok!(provider.create_cache(&cache(Tier::Dev), &OperationContext::new()).await);
    assert_eq!(sim.counters().cache_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_budget_exhausted() {
    let (sim, provider) = setup();
    sim.inject_transient_failures(100);

    let err = provider
        .create_cache(&cache(Tier::Dev), &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Transient { attempts: 5, .. }));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_fatal_rejection_does_not_poll() {
    let (sim, provider) = setup();
    sim.reject_next(ErrorCode::QuotaExceeded, "cluster quota exceeded");

    let err = provider
        .create_cache(&cache(Tier::Dev), &OperationContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(err.to_string().contains("cluster quota exceeded"));
    // Only the initial describe
    assert_eq!(sim.counters().describes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_failure_carries_vendor_reason() {
    let (sim, provider) = setup();
    sim.fail_provisioning("insufficient cache cluster capacity");

    let err = provider
        .create_cache(&cache(Tier::Dev), &OperationContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Provisioning);
    assert!(
        err.vendor_reason()
            .is_some_and(|r| r.contains("insufficient cache cluster capacity"))
    );
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_remove_cache_while_creating() {
    let (sim, provider) = setup();
    sim.stall(true);
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(30));
    let _ = provider.create_cache(&cache(Tier::Dev), &ctx).await;
    sim.stall(false);

    assert_ok!(provider.remove_cache(&cache(Tier::Dev), &OperationContext::new()).await);
    assert_eq!(sim.cache_status("c1"), None);
    assert_eq!(sim.counters().cache_deletes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_cache_twice() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    assert_ok!(provider.remove_cache(&cache(Tier::Dev), &ctx).await);
    assert_ok!(provider.remove_cache(&cache(Tier::Dev), &ctx).await);
    assert_eq!(sim.counters().cache_deletes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_failure_is_reported() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    sim.fail_deletion("snapshot in progress");

    let err = provider.remove_cache(&cache(Tier::Dev), &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeleteFailed);
    assert_eq!(sim.cache_status("c1").as_deref(), Some("delete-failed"));

    // A later remove resubmits the delete
    sim.clear_failures();
    assert_ok!(provider.remove_cache(&cache(Tier::Dev), &ctx).await);
    assert_eq!(sim.cache_status("c1"), None);
}

#[tokio::test(start_paused = true)]
async fn test_create_waits_for_previous_delete() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap();
    sim.delete_replication_group("c1").await.unwrap();
    assert_eq!(sim.cache_status("c1").as_deref(), Some("deleting"));

    assert_ok!(provider.create_cache(&cache(Tier::Dev), &ctx).await);
    assert_eq!(sim.counters().cache_creates, 2);
    assert_eq!(sim.cache_status("c1").as_deref(), Some("available"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_hanging_submit() {
    let (sim, provider) = hanging_setup();

    let token = CancellationToken::new();
    let ctx = OperationContext::new()
        .with_cancellation(token.clone())
        .with_timeout(Duration::from_secs(10));
    let started = tokio::time::Instant::now();

    let spec = cache(Tier::Dev);
    let (result, ()) = tokio::join!(provider.create_cache(&spec, &ctx), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    // The abandoned request never reached the vendor
    assert_eq!(sim.cache_status("c1"), None);
    assert_eq!(sim.counters().cache_creates, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_submit_hits_deadline() {
    let (_sim, provider) = hanging_setup();
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(10));
    let started = tokio::time::Instant::now();

    let err = provider
        .create_cache(&cache(Tier::Dev), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CloudError::Timeout { after, .. } if after == Duration::from_secs(10)
    ));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

/// Waiting out a previous delete and the new create share one deadline
#[tokio::test(start_paused = true)]
async fn test_delete_wait_and_create_share_deadline() {
    let (sim, provider) = setup();
    sim.settle_after(5);

    provider
        .create_cache(&cache(Tier::Dev), &OperationContext::new())
        .await
        .unwrap();
    sim.delete_replication_group("c1").await.unwrap();

    // About 14s of delete wait plus 30s of create polling
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(40));
    let started = tokio::time::Instant::now();
    let err = provider.create_cache(&cache(Tier::Dev), &ctx).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() <= Duration::from_secs(40));
    assert_eq!(sim.counters().cache_creates, 2);

    // The resubmitted create is picked up, not duplicated
    assert_ok!(
        provider
            .create_cache(&cache(Tier::Dev), &OperationContext::new())
            .await
    );
    assert_eq!(sim.counters().cache_creates, 2);
}

// ========== Database ==========

#[tokio::test(start_paused = true)]
async fn test_create_database_is_idempotent() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    let first = provider
        .create_database(&database(Tier::Dev), &ctx)
        .await
        .unwrap();
    let second = provider
        .create_database(&database(Tier::Dev), &ctx)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(sim.counters().db_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_database_timeout_then_reattach() {
    let (sim, provider) = setup();
    sim.stall(true);

    let ctx = OperationContext::new().with_timeout(Duration::from_secs(60));
    let err = provider
        .create_database(&database(Tier::Dev), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(sim.db_status("mycluster").as_deref(), Some("creating"));

    sim.stall(false);
    let coords = provider
        .create_database(&database(Tier::Dev), &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(coords.database.as_deref(), Some("mydb"));
    assert_eq!(sim.counters().db_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_database_coordinates() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    let coords = provider
        .create_database(&database(Tier::Dev), &ctx)
        .await
        .unwrap();

    assert_eq!(coords.port, 5432);
    assert_eq!(coords.database.as_deref(), Some("mydb"));
    let credentials = coords.credentials.clone().unwrap();
    assert_eq!(credentials.store, "secretsmanager");
    assert!(credentials.key.ends_with("rds!db-mycluster"));
    assert!(coords.to_string().contains("/mydb"));

    let request = sim.db_request("mycluster").unwrap();
    assert_eq!(request.db_instance_class, "db.t3.micro");
    assert_eq!(request.allocated_storage_gb, 50);
    assert_eq!(request.backup_retention_days, 7);
    assert!(!request.multi_az);
    assert!(
        request
            .tags
            .iter()
            .any(|t| t.key == "managed-by" && t.value == "provisio")
    );
}

#[tokio::test(start_paused = true)]
async fn test_database_name_change_is_conflict() {
    let (_sim, provider) = setup();
    let ctx = OperationContext::new();

    provider
        .create_database(&database(Tier::Dev), &ctx)
        .await
        .unwrap();

    let renamed = DatabaseDescriptor {
        database_name: "otherdb".to_string(),
        ..database(Tier::Dev)
    };
    let err = provider.create_database(&renamed, &ctx).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test(start_paused = true)]
async fn test_prod_database_takes_final_snapshot() {
    let (sim, provider) = setup();
    let ctx = OperationContext::new();

    provider
        .create_database(&database(Tier::Prod), &ctx)
        .await
        .unwrap();
    assert!(sim.db_request("mycluster").unwrap().multi_az);

    provider
        .remove_database(&database(Tier::Prod), &ctx)
        .await
        .unwrap();

    let snapshots = sim.final_snapshots();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].starts_with("mycluster-final-"));
}

#[tokio::test(start_paused = true)]
async fn test_database_out_of_range_storage() {
    let (sim, provider) = setup();

    let tiny = DatabaseDescriptor {
        storage_size_gb: 5,
        ..database(Tier::Dev)
    };
    let err = provider
        .create_database(&tiny, &OperationContext::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(sim.counters().calls, 0);
}

// ========== Auth ==========

#[tokio::test]
async fn test_check_auth() {
    let (sim, provider) = setup();

    let status = provider.check_auth().await.unwrap();
    assert!(status.authenticated);
    assert!(status.account_info.unwrap().contains("123456789012"));

    let with_profile = AwsProvider::new(
        sim.clone(),
        AwsSettings::new("us-east-1").with_credentials_ref("profile:ops"),
    );
    let status = with_profile.check_auth().await.unwrap();
    assert!(status.account_info.unwrap().ends_with("via profile:ops"));

    sim.revoke_credentials(true);
    let status = provider.check_auth().await.unwrap();
    assert!(!status.authenticated);
    assert!(status.error.is_some());
}
