//! Resource synchronization for Tenant resources
//!
//! Maps a Tenant spec onto its four child resources and ensures each exists
//! with create-if-absent semantics. Existing objects are left untouched.

use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{
    namespace_builder, network_policy_builder, quantity, quota_builder, role_binding_builder,
};
use crate::crd::{Tenant, TenantQuota};
use crate::metrics::prometheus::CHILD_CREATES;
use crate::store::{with_timeout, ChildKind, ChildResource, ClusterStore, CreateOutcome};
use crate::{Error, Result};

/// Longest valid namespace name
const MAX_NAME_LEN: usize = 63;

/// Why a child resource could not be ensured
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureCause {
    pub message: String,
    pub transient: bool,
}

impl From<&Error> for FailureCause {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Result of ensuring one child resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceOutcome {
    Applied,
    AlreadyPresent,
    Failed(FailureCause),
}

impl ResourceOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ResourceOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            ResourceOutcome::Applied => "applied",
            ResourceOutcome::AlreadyPresent => "already_present",
            ResourceOutcome::Failed(cause) if cause.transient => "failed_transient",
            ResourceOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-kind outcomes of one pass, in the order the kinds were attempted.
/// Kinds never attempted are absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    outcomes: Vec<(ChildKind, ResourceOutcome)>,
}

impl SyncReport {
    pub fn from_outcomes(outcomes: Vec<(ChildKind, ResourceOutcome)>) -> Self {
        Self { outcomes }
    }

    pub fn outcome(&self, kind: ChildKind) -> Option<&ResourceOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }

    pub fn outcomes(&self) -> &[(ChildKind, ResourceOutcome)] {
        &self.outcomes
    }

    /// The failure that ended the pass, if any
    pub fn failure(&self) -> Option<(ChildKind, &FailureCause)> {
        self.outcomes.iter().find_map(|(kind, outcome)| match outcome {
            ResourceOutcome::Failed(cause) => Some((*kind, cause)),
            _ => None,
        })
    }

    /// All four kinds were attempted and each one succeeded
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == DesiredResources::KINDS && self.failure().is_none()
    }

    fn record(&mut self, kind: ChildKind, outcome: ResourceOutcome) -> bool {
        let success = outcome.is_success();
        self.outcomes.push((kind, outcome));
        success
    }
}

/// Child resources a Tenant spec maps to
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredResources {
    /// Must exist before anything else is attempted
    pub namespace: ChildResource,
    /// Namespace-scoped kinds, attempted in order
    pub scoped: Vec<ChildResource>,
}

impl DesiredResources {
    const KINDS: usize = 4;

    /// Compute the child resources of a validated Tenant
    pub fn from_tenant(tenant: &Tenant) -> Result<Self> {
        validate(tenant)?;

        Ok(Self {
            namespace: ChildResource::Namespace(namespace_builder::build_namespace(tenant)),
            scoped: vec![
                ChildResource::ResourceQuota(quota_builder::build_resource_quota(tenant)?),
                ChildResource::NetworkPolicy(network_policy_builder::build_default_deny_ingress(
                    tenant,
                )),
                ChildResource::RoleBinding(role_binding_builder::build_role_binding(tenant)),
            ],
        })
    }
}

/// Validate a Tenant before any call reaches the cluster
pub fn validate(tenant: &Tenant) -> Result<()> {
    let name = tenant.name_any();

    if name.is_empty() {
        return Err(Error::ValidationError("metadata.name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::ValidationError(format!(
            "metadata.name must be at most {} characters to be used as a namespace",
            MAX_NAME_LEN
        )));
    }

    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let valid_ends = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_chars || !valid_ends {
        return Err(Error::ValidationError(format!(
            "metadata.name {:?} must be a DNS-1123 label (lowercase alphanumerics and '-')",
            name
        )));
    }

    if tenant.spec.owner.trim().is_empty() {
        return Err(Error::ValidationError("spec.owner cannot be empty".to_string()));
    }

    validate_quota(&tenant.spec.quota)
}

fn validate_quota(quota: &TenantQuota) -> Result<()> {
    let quantities = [
        ("spec.quota.cpu", &quota.cpu),
        ("spec.quota.cpuLimit", &quota.cpu_limit),
        ("spec.quota.memory", &quota.memory),
        ("spec.quota.memoryLimit", &quota.memory_limit),
    ];

    for (field, value) in quantities {
        if let Some(raw) = value {
            quantity::parse_quantity(field, raw)?;
        }
    }

    Ok(())
}

/// Ensures the child resources of a Tenant exist
pub struct Synchronizer<'a> {
    store: &'a dyn ClusterStore,
    call_timeout: Duration,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn ClusterStore, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Run one synchronization pass.
    ///
    /// Fails only when the spec does not validate, in which case no call is
    /// made. Otherwise the Namespace is ensured first and the remaining kinds
    /// follow in order until one of them fails.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.name_any()))]
    pub async fn synchronize(&self, tenant: &Tenant) -> Result<SyncReport> {
        let desired = DesiredResources::from_tenant(tenant)?;
        let mut report = SyncReport::default();

        let outcome = self.ensure(&desired.namespace).await;
        if !report.record(ChildKind::Namespace, outcome) {
            warn!("Namespace could not be ensured, skipping namespaced resources");
            return Ok(report);
        }

        for resource in &desired.scoped {
            let outcome = self.ensure(resource).await;
            if !report.record(resource.kind(), outcome) {
                break;
            }
        }

        Ok(report)
    }

    async fn ensure(&self, resource: &ChildResource) -> ResourceOutcome {
        let kind = resource.kind();
        let operation = format!("create {} {}", kind, resource.name());

        let outcome = match with_timeout(&operation, self.call_timeout, self.store.create(resource))
            .await
        {
            Ok(CreateOutcome::Created) => {
                info!("Created {} {}", kind, resource.name());
                ResourceOutcome::Applied
            }
            Ok(CreateOutcome::AlreadyExists) => {
                debug!("{} {} already present", kind, resource.name());
                ResourceOutcome::AlreadyPresent
            }
            Err(e) => {
                warn!(
                    transient = e.is_transient(),
                    "Failed to {}: {}", operation, e
                );
                ResourceOutcome::Failed(FailureCause::from(&e))
            }
        };

        CHILD_CREATES
            .with_label_values(&[kind.as_str(), outcome.label()])
            .inc();

        outcome
    }
}
