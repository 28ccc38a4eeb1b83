//! Translation of raw AWS statuses into [`ProvisioningState`]

use provisio_cloud::ProvisioningState;

/// ElastiCache replication group status
pub fn cache_state(status: &str) -> ProvisioningState {
    match status.to_lowercase().as_str() {
        "available" => ProvisioningState::Available,
        "creating" | "modifying" | "snapshotting" => ProvisioningState::Provisioning,
        "create-failed" => ProvisioningState::Failed,
        "deleting" => ProvisioningState::Deleting,
        "delete-failed" => ProvisioningState::DeleteFailed,
        other => {
            tracing::warn!(status = other, "unrecognized replication group status");
            ProvisioningState::Provisioning
        }
    }
}

/// RDS instance status
pub fn database_state(status: &str) -> ProvisioningState {
    let status = status.to_lowercase();
    match status.as_str() {
        "available" | "backing-up" | "storage-optimization" => ProvisioningState::Available,
        "failed"
        | "storage-full"
        | "inaccessible-encryption-credentials"
        | "restore-error"
        | "stopped" => ProvisioningState::Failed,
        s if s.starts_with("incompatible-") => ProvisioningState::Failed,
        "deleting" => ProvisioningState::Deleting,
        "delete-failed" => ProvisioningState::DeleteFailed,
        // creating, modifying, rebooting, upgrading, starting, maintenance, ...
        _ => ProvisioningState::Provisioning,
    }
}

/// Failure reason to report: the vendor's explanation if it gave one,
/// otherwise the raw status itself
pub fn failure_reason(status: &str, status_reason: Option<&str>) -> String {
    match status_reason {
        Some(reason) if !reason.is_empty() => format!("{status}: {reason}"),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_states() {
        assert_eq!(cache_state("available"), ProvisioningState::Available);
        assert_eq!(cache_state("creating"), ProvisioningState::Provisioning);
        assert_eq!(cache_state("modifying"), ProvisioningState::Provisioning);
        assert_eq!(cache_state("create-failed"), ProvisioningState::Failed);
        assert_eq!(cache_state("deleting"), ProvisioningState::Deleting);
        assert_eq!(cache_state("something-new"), ProvisioningState::Provisioning);
    }

    #[test]
    fn test_database_states() {
        assert_eq!(database_state("available"), ProvisioningState::Available);
        assert_eq!(database_state("backing-up"), ProvisioningState::Available);
        assert_eq!(database_state("creating"), ProvisioningState::Provisioning);
        assert_eq!(database_state("configuring-enhanced-monitoring"), ProvisioningState::Provisioning);
        assert_eq!(database_state("incompatible-parameters"), ProvisioningState::Failed);
        assert_eq!(database_state("storage-full"), ProvisioningState::Failed);
        assert_eq!(database_state("Deleting"), ProvisioningState::Deleting);
    }

    #[test]
    fn test_failure_reason() {
        assert_eq!(failure_reason("failed", None), "failed");
        assert_eq!(failure_reason("failed", Some("")), "failed");
        assert_eq!(
            failure_reason("create-failed", Some("insufficient capacity")),
            "create-failed: insufficient capacity"
        );
    }
}
