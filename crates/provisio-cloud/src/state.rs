//! Provisioning state of a single resource
//!
//! The vendor control plane is the source of truth. These types only
//! describe what one call observed while driving a resource to a terminal
//! state; nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform state of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Caller asked for the resource; nothing observed yet
    Requested,
    /// Vendor is creating or modifying the resource
    Provisioning,
    /// Resource is usable
    Available,
    /// Vendor reported a terminal creation failure
    Failed,
    /// Vendor is deleting the resource
    Deleting,
    /// Resource no longer exists
    Deleted,
    /// Vendor reported a terminal deletion failure
    DeleteFailed,
}

impl ProvisioningState {
    /// No further automatic transition happens from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Available
                | ProvisioningState::Failed
                | ProvisioningState::Deleted
                | ProvisioningState::DeleteFailed
        )
    }

    pub fn can_transition_to(&self, next: ProvisioningState) -> bool {
        use ProvisioningState::*;

        if *self == next {
            return !self.is_terminal();
        }
        match self {
            // Adoption can observe any state of an existing resource
            Requested => true,
            Provisioning => matches!(next, Available | Failed | Deleting),
            Available => matches!(next, Provisioning | Deleting),
            Failed => matches!(next, Deleting),
            Deleting => matches!(next, Deleted | DeleteFailed),
            Deleted => matches!(next, Provisioning),
            DeleteFailed => matches!(next, Deleting),
        }
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningState::Requested => write!(f, "requested"),
            ProvisioningState::Provisioning => write!(f, "provisioning"),
            ProvisioningState::Available => write!(f, "available"),
            ProvisioningState::Failed => write!(f, "failed"),
            ProvisioningState::Deleting => write!(f, "deleting"),
            ProvisioningState::Deleted => write!(f, "deleted"),
            ProvisioningState::DeleteFailed => write!(f, "delete_failed"),
        }
    }
}

/// One observed state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ProvisioningState,
    pub to: ProvisioningState,
    /// Vendor status string that produced the transition
    pub vendor_status: Option<String>,
    pub at: DateTime<Utc>,
}

/// State history of one operation on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTracker {
    resource: String,
    current: ProvisioningState,
    started_at: DateTime<Utc>,
    history: Vec<StateTransition>,
}

impl StateTracker {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            current: ProvisioningState::Requested,
            started_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn current(&self) -> ProvisioningState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record an observation. Repeated observations of the same state are
    /// not recorded.
    pub fn observe(&mut self, next: ProvisioningState, vendor_status: Option<&str>) {
        if next == self.current {
            return;
        }

        if self.current.can_transition_to(next) {
            tracing::info!(
                resource = %self.resource,
                from = %self.current,
                to = %next,
                vendor_status = vendor_status.unwrap_or("-"),
                "state transition"
            );
        } else {
            tracing::warn!(
                resource = %self.resource,
                from = %self.current,
                to = %next,
                vendor_status = vendor_status.unwrap_or("-"),
                "unexpected state transition"
            );
        }

        self.history.push(StateTransition {
            from: self.current,
            to: next,
            vendor_status: vendor_status.map(str::to_string),
            at: Utc::now(),
        });
        self.current = next;
    }
}
