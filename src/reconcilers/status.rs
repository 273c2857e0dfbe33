//! Status reporting for Tenant resources

use chrono::Utc;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::crd::{AppliedResources, Condition, Tenant, TenantPhase, TenantStatus};
use crate::metrics::prometheus::{record_phase, STATUS_WRITES};
use crate::reconcilers::tenant::SyncReport;
use crate::store::{with_timeout, ChildKind, ClusterStore};
use crate::{Error, Result};

/// Type of the condition summarizing the phase
pub const READY_CONDITION: &str = "Ready";

/// Whether the stored status has not yet seen `generation`, so a pass
/// starting now should announce itself
pub fn needs_in_flight(previous: Option<&TenantStatus>, generation: i64) -> bool {
    previous.and_then(|s| s.observed_generation) != Some(generation)
}

/// Status published when a pass starts on a generation not yet observed
pub fn in_flight(previous: Option<&TenantStatus>, generation: i64) -> TenantStatus {
    let applied = previous.map(|s| s.applied).unwrap_or_default();
    let last_error = previous.and_then(|s| s.last_error.clone());

    build(
        previous,
        generation,
        TenantPhase::Reconciling,
        applied,
        last_error,
        "Reconciling",
        "Reconciliation in progress".to_string(),
    )
}

/// Status after a synchronization pass ran against the cluster
pub fn from_report(
    previous: Option<&TenantStatus>,
    generation: i64,
    report: &SyncReport,
) -> TenantStatus {
    let applied = merge_ledger(previous.map(|s| s.applied).unwrap_or_default(), report);

    if report.is_complete() {
        return build(
            previous,
            generation,
            TenantPhase::Ready,
            applied,
            None,
            "ResourcesApplied",
            "All tenant resources are in place".to_string(),
        );
    }

    let (phase, reason, message) = match report.failure() {
        Some((kind, cause)) if cause.transient => (
            TenantPhase::Reconciling,
            "RetryingAfterFailure",
            format!("{}: {}", kind, cause.message),
        ),
        Some((kind, cause)) => (
            TenantPhase::Failed,
            "ApplyFailed",
            format!("{}: {}", kind, cause.message),
        ),
        // Nothing failed but not everything was attempted
        None => (
            TenantPhase::Reconciling,
            "Incomplete",
            "Not all tenant resources were attempted".to_string(),
        ),
    };

    build(
        previous,
        generation,
        phase,
        applied,
        Some(message.clone()),
        reason,
        message,
    )
}

/// Status for a spec that failed local validation; the ledger is untouched
pub fn from_validation_error(
    previous: Option<&TenantStatus>,
    generation: i64,
    err: &Error,
) -> TenantStatus {
    let applied = previous.map(|s| s.applied).unwrap_or_default();
    let message = err.to_string();

    build(
        previous,
        generation,
        TenantPhase::Failed,
        applied,
        Some(message.clone()),
        "InvalidSpec",
        message,
    )
}

/// Whether the Tenant a pass worked on has been replaced by `latest`.
///
/// A newer generation supersedes the pass. So does a different UID: a Tenant
/// deleted and recreated under the same name starts again at generation 1.
pub fn is_superseded(worked_on: &Tenant, latest: &Tenant) -> bool {
    worked_on.uid() != latest.uid() || latest.generation() > worked_on.generation()
}

/// Update the ledger for every kind attempted in this pass. Kinds that were
/// not attempted keep the value from earlier passes.
fn merge_ledger(mut applied: AppliedResources, report: &SyncReport) -> AppliedResources {
    for (kind, outcome) in report.outcomes() {
        let ok = outcome.is_success();
        match kind {
            ChildKind::Namespace => applied.namespace_created = ok,
            ChildKind::ResourceQuota => applied.quota_applied = ok,
            ChildKind::NetworkPolicy => applied.network_policy_applied = ok,
            ChildKind::RoleBinding => applied.rbac_applied = ok,
        }
    }
    applied
}

fn build(
    previous: Option<&TenantStatus>,
    generation: i64,
    phase: TenantPhase,
    applied: AppliedResources,
    last_error: Option<String>,
    reason: &str,
    message: String,
) -> TenantStatus {
    let now = Utc::now();
    let ready = if phase == TenantPhase::Ready { "True" } else { "False" };

    // Keep the transition time while the condition status is unchanged
    let last_transition_time = previous
        .and_then(|s| s.condition(READY_CONDITION))
        .filter(|c| c.status == ready)
        .map(|c| c.last_transition_time)
        .unwrap_or(now);

    TenantStatus {
        phase,
        applied,
        last_error,
        observed_generation: Some(generation),
        last_update_time: Some(now),
        conditions: vec![Condition {
            type_: READY_CONDITION.to_string(),
            status: ready.to_string(),
            last_transition_time,
            reason: Some(reason.to_string()),
            message: Some(message),
        }],
    }
}

/// Persists computed statuses onto the Tenant
pub struct StatusReporter<'a> {
    store: &'a dyn ClusterStore,
    call_timeout: Duration,
}

impl<'a> StatusReporter<'a> {
    pub fn new(store: &'a dyn ClusterStore, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Write a status block. Every failure here is transient to the caller.
    pub async fn publish(&self, name: &str, status: &TenantStatus) -> Result<()> {
        let operation = format!("write status of tenant {}", name);
        let result = with_timeout(
            &operation,
            self.call_timeout,
            self.store.write_status(name, status),
        )
        .await;

        match &result {
            Ok(()) => {
                STATUS_WRITES.with_label_values(&["ok"]).inc();
                record_phase(name, status.phase);
                info!(
                    "Updated status for tenant {}: phase={}, generation={:?}",
                    name, status.phase, status.observed_generation
                );
            }
            Err(Error::ConflictError(_)) => {
                STATUS_WRITES.with_label_values(&["conflict"]).inc();
                debug!("Status write for tenant {} conflicted", name);
            }
            Err(e) => {
                STATUS_WRITES.with_label_values(&["error"]).inc();
                warn!("Failed to {}: {}", operation, e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TenantSpec;
    use crate::reconcilers::tenant::{FailureCause, ResourceOutcome};

    fn report(outcomes: Vec<(ChildKind, ResourceOutcome)>) -> SyncReport {
        SyncReport::from_outcomes(outcomes)
    }

    fn transient(message: &str) -> ResourceOutcome {
        ResourceOutcome::Failed(FailureCause {
            message: message.to_string(),
            transient: true,
        })
    }

    #[test]
    fn complete_report_is_ready() {
        let status = from_report(
            None,
            2,
            &report(vec![
                (ChildKind::Namespace, ResourceOutcome::Applied),
                (ChildKind::ResourceQuota, ResourceOutcome::AlreadyPresent),
                (ChildKind::NetworkPolicy, ResourceOutcome::Applied),
                (ChildKind::RoleBinding, ResourceOutcome::Applied),
            ]),
        );

        assert_eq!(status.phase, TenantPhase::Ready);
        assert!(status.applied.all_applied());
        assert_eq!(status.last_error, None);
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.condition(READY_CONDITION).unwrap().status, "True");
    }

    #[test]
    fn unattempted_kinds_keep_previous_values() {
        let previous = TenantStatus {
            applied: AppliedResources {
                rbac_applied: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let status = from_report(
            Some(&previous),
            1,
            &report(vec![
                (ChildKind::Namespace, ResourceOutcome::AlreadyPresent),
                (ChildKind::ResourceQuota, ResourceOutcome::Applied),
                (ChildKind::NetworkPolicy, transient("unavailable")),
            ]),
        );

        assert_eq!(status.phase, TenantPhase::Reconciling);
        assert!(status.applied.namespace_created);
        assert!(status.applied.quota_applied);
        assert!(!status.applied.network_policy_applied);
        assert!(status.applied.rbac_applied);
        assert!(status.last_error.unwrap().starts_with("NetworkPolicy"));
    }

    #[test]
    fn permanent_create_failure_fails() {
        let status = from_report(
            None,
            1,
            &report(vec![(
                ChildKind::Namespace,
                ResourceOutcome::Failed(FailureCause {
                    message: "forbidden".to_string(),
                    transient: false,
                }),
            )]),
        );
        assert_eq!(status.phase, TenantPhase::Failed);
        assert!(!status.applied.namespace_created);
    }

    #[test]
    fn validation_failure_leaves_ledger_alone() {
        let previous = TenantStatus {
            phase: TenantPhase::Ready,
            applied: AppliedResources {
                namespace_created: true,
                quota_applied: true,
                network_policy_applied: true,
                rbac_applied: true,
            },
            ..Default::default()
        };
        let err = Error::ValidationError("spec.quota.cpu is invalid".to_string());

        let status = from_validation_error(Some(&previous), 4, &err);
        assert_eq!(status.phase, TenantPhase::Failed);
        assert_eq!(status.applied, previous.applied);
        assert!(status.last_error.unwrap().contains("spec.quota.cpu"));
    }

    #[test]
    fn transition_time_survives_unchanged_condition() {
        let first = in_flight(None, 1);
        let second = in_flight(Some(&first), 1);
        assert_eq!(
            first.condition(READY_CONDITION).unwrap().last_transition_time,
            second.condition(READY_CONDITION).unwrap().last_transition_time
        );
    }

    #[test]
    fn in_flight_only_for_unobserved_generations() {
        assert!(needs_in_flight(None, 1));
        let status = in_flight(None, 1);
        assert!(!needs_in_flight(Some(&status), 1));
        assert!(needs_in_flight(Some(&status), 2));
    }

    fn tenant(uid: &str, generation: i64) -> Tenant {
        let mut tenant = Tenant::new(
            "candidate",
            TenantSpec {
                owner: "team-candidate".to_string(),
                ..Default::default()
            },
        );
        tenant.metadata.uid = Some(uid.to_string());
        tenant.metadata.generation = Some(generation);
        tenant
    }

    #[test]
    fn newer_generation_supersedes_a_pass() {
        assert!(is_superseded(&tenant("uid-1", 3), &tenant("uid-1", 4)));
        assert!(!is_superseded(&tenant("uid-1", 3), &tenant("uid-1", 3)));
    }

    #[test]
    fn recreated_tenant_supersedes_a_pass_despite_lower_generation() {
        assert!(is_superseded(&tenant("uid-1", 3), &tenant("uid-2", 1)));
        assert!(!is_superseded(&tenant("uid-2", 1), &tenant("uid-2", 1)));
    }
}
